use super::atom::Atom;
use super::port::Context;
use super::{Error, Object};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::debug;

pub type Constructor = fn(&mut Context<'_>, &[Atom]) -> Box<dyn Object>;

/// Creation argument signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Required float.
    Float,
    /// Optional float, `0.0` when omitted.
    DefFloat,
}

/// Class descriptor: what the host needs to create and schedule objects
/// of one type.
#[derive(Clone, Copy)]
pub struct Class {
    pub name: &'static str,
    pub new: Constructor,
    pub args: &'static [ArgType],
    /// Inlet 0 is a signal inlet that also accepts floats as a constant
    /// signal.
    pub main_signal_in: bool,
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("main_signal_in", &self.main_signal_in)
            .finish()
    }
}

impl Class {
    /// Checks `args` against the signature and fills in defaults. Extra
    /// arguments are ignored.
    pub fn normalize_args(&self, args: &[Atom]) -> Result<Vec<Atom>, Error> {
        let mut normalized = Vec::with_capacity(self.args.len());
        for (index, arg_type) in self.args.iter().enumerate() {
            let value = match (arg_type, args.get(index)) {
                (_, Some(Atom::Float(value))) => *value,
                (_, Some(Atom::Symbol(symbol))) => {
                    return Err(Error::BadArguments {
                        class: self.name,
                        reason: format!("argument {} should be a float, got '{}'", index, symbol),
                    })
                }
                (ArgType::DefFloat, None) => 0.0,
                (ArgType::Float, None) => {
                    return Err(Error::BadArguments {
                        class: self.name,
                        reason: format!("missing float argument {}", index),
                    })
                }
            };
            normalized.push(Atom::Float(value));
        }
        Ok(normalized)
    }
}

fn registry() -> &'static Mutex<HashMap<&'static str, Class>> {
    static REGISTRY: OnceLock<Mutex<HashMap<&'static str, Class>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers a class process-wide. A name can only be taken once.
pub fn class_new(class: Class) -> Result<(), Error> {
    let mut classes = registry().lock().unwrap_or_else(PoisonError::into_inner);
    if classes.contains_key(class.name) {
        return Err(Error::DuplicateClass(class.name));
    }
    debug!(class = class.name, "registered class");
    classes.insert(class.name, class);
    Ok(())
}

pub fn find(name: &str) -> Option<Class> {
    registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .copied()
}

pub fn registered() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .copied()
        .collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DspAdd, Inputs, Outputs, Sample, SignalId};

    struct Nop;

    impl Object for Nop {
        fn float(&mut self, _inlet: usize, _value: Sample) -> Result<(), Error> {
            Ok(())
        }

        fn dsp(&mut self, _sp: &[SignalId], _chain: &mut DspAdd<'_>) {}

        fn perform(&mut self, _inputs: Inputs<'_>, _outputs: Outputs<'_>) {}
    }

    fn nop_new(_ctx: &mut Context<'_>, _args: &[Atom]) -> Box<dyn Object> {
        Box::new(Nop)
    }

    fn nop_class(name: &'static str, args: &'static [ArgType]) -> Class {
        Class {
            name,
            new: nop_new,
            args,
            main_signal_in: false,
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        class_new(nop_class("class_test_dup", &[])).unwrap();
        assert_eq!(
            class_new(nop_class("class_test_dup", &[])),
            Err(Error::DuplicateClass("class_test_dup"))
        );
        assert!(find("class_test_dup").is_some());
        assert!(registered().contains(&"class_test_dup"));
    }

    #[test]
    fn unknown_class_is_not_found() {
        assert!(find("class_test_missing").is_none());
    }

    #[test]
    fn def_float_defaults_to_zero() {
        let class = nop_class("class_test_args", &[ArgType::DefFloat]);
        assert_eq!(class.normalize_args(&[]).unwrap(), vec![Atom::Float(0.0)]);
        assert_eq!(
            class
                .normalize_args(&[Atom::Float(0.5), Atom::Float(9.0)])
                .unwrap(),
            vec![Atom::Float(0.5)]
        );
    }

    #[test]
    fn symbols_and_missing_required_floats_are_bad_arguments() {
        let class = nop_class("class_test_args", &[ArgType::Float]);
        assert!(matches!(
            class.normalize_args(&[]),
            Err(Error::BadArguments { .. })
        ));
        assert!(matches!(
            class.normalize_args(&[Atom::Symbol(String::from("x"))]),
            Err(Error::BadArguments { .. })
        ));
    }
}
