use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InletKind {
    Signal,
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutletKind {
    Signal,
    Control,
}

/// Counts the inlet/outlet handles currently alive in one graph.
#[derive(Debug, Default)]
pub struct PortLedger {
    live: AtomicUsize,
}

impl PortLedger {
    pub fn new() -> PortLedger {
        PortLedger::default()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

// Released exactly once, when the owning handle is dropped.
#[derive(Debug)]
struct Lease {
    ledger: Arc<PortLedger>,
}

impl Lease {
    fn new(ledger: &Arc<PortLedger>) -> Lease {
        ledger.live.fetch_add(1, Ordering::SeqCst);
        Lease {
            ledger: ledger.clone(),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.ledger.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct Inlet {
    index: usize,
    _lease: Lease,
}

impl Inlet {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug)]
pub struct Outlet {
    index: usize,
    _lease: Lease,
}

impl Outlet {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Construction context handed to a class constructor. Inlet 0 exists
/// implicitly; every further inlet and every outlet is created here.
pub struct Context<'a> {
    ledger: &'a Arc<PortLedger>,
    inlets: Vec<InletKind>,
    outlets: Vec<OutletKind>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(ledger: &'a Arc<PortLedger>, main_signal_in: bool) -> Context<'a> {
        let main = if main_signal_in {
            InletKind::Signal
        } else {
            InletKind::Control
        };
        Context {
            ledger,
            inlets: vec![main],
            outlets: vec![],
        }
    }

    pub fn inlet_new(&mut self, kind: InletKind) -> Inlet {
        self.inlets.push(kind);
        Inlet {
            index: self.inlets.len() - 1,
            _lease: Lease::new(self.ledger),
        }
    }

    pub fn outlet_new(&mut self, kind: OutletKind) -> Outlet {
        self.outlets.push(kind);
        Outlet {
            index: self.outlets.len() - 1,
            _lease: Lease::new(self.ledger),
        }
    }

    pub(crate) fn into_layout(self) -> (Vec<InletKind>, Vec<OutletKind>) {
        (self.inlets, self.outlets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_release_on_drop() {
        let ledger = Arc::new(PortLedger::new());
        let mut ctx = Context::new(&ledger, true);
        let inlet = ctx.inlet_new(InletKind::Signal);
        let outlet = ctx.outlet_new(OutletKind::Signal);
        assert_eq!(inlet.index(), 1);
        assert_eq!(outlet.index(), 0);
        assert_eq!(ledger.live(), 2);

        drop(inlet);
        assert_eq!(ledger.live(), 1);
        drop(outlet);
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn main_inlet_is_implicit() {
        let ledger = Arc::new(PortLedger::new());
        let ctx = Context::new(&ledger, false);
        let (inlets, outlets) = ctx.into_layout();
        assert_eq!(inlets, vec![InletKind::Control]);
        assert!(outlets.is_empty());
        assert_eq!(ledger.live(), 0);
    }
}
