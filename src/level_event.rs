use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// A flag that, once raised, stays raised; threads can wait for it.
#[derive(Clone, Default)]
pub struct LevelEvent {
    flag: Arc<(Mutex<bool>, Condvar)>,
}

impl LevelEvent {
    pub fn new() -> LevelEvent {
        LevelEvent::default()
    }

    pub fn test(&self) -> bool {
        *self.flag.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wait(&self) {
        let (lock, condvar) = &*self.flag;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = condvar
            .wait_while(guard, |flag| !*flag)
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub fn activate(&self) {
        let (lock, condvar) = &*self.flag;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wakes_waiters() {
        let event = LevelEvent::new();
        assert!(!event.test());
        let waiter = {
            let event = event.clone();
            thread::spawn(move || event.wait())
        };
        event.activate();
        waiter.join().unwrap();
        assert!(event.test());
    }
}
