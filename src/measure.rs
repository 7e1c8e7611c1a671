use std::time::{Duration, Instant};

pub fn measure<F, T>(f: F) -> (Duration, T)
where
    F: FnOnce() -> T,
{
    let t1 = Instant::now();
    let value = f();
    let t2 = Instant::now();
    (t2 - t1, value)
}

/// Running timing statistics of a repeated operation, e.g. one block.
#[derive(Debug, Default)]
pub struct Repeated {
    num_samples: u32,
    total_time: Duration,
    max_time: Duration,
}

impl Repeated {
    pub fn new() -> Self {
        Repeated::default()
    }

    pub fn measure<F, T>(&mut self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let (time, retval) = measure(f);
        self.record(time);
        retval
    }

    pub fn record(&mut self, time: Duration) {
        self.num_samples += 1;
        self.total_time += time;
        self.max_time = self.max_time.max(time);
    }

    pub fn average(&self) -> Duration {
        if self.num_samples == 0 {
            Duration::default()
        } else {
            self.total_time / self.num_samples
        }
    }

    pub fn max_time(&self) -> Duration {
        self.max_time
    }
}
