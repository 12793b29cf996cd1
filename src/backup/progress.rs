use log::{debug, info};

/// Receives the declared size of every newly archived message.
pub trait Progress {
    fn advance(&mut self, bytes: u64);
}

/// Logs progress of one folder in steps of ten percent.
pub struct LogProgress {
    folder: String,
    total: u64,
    transferred: u64,
    logged_step: u64,
}

impl LogProgress {
    pub fn new(folder: &str, total: u64) -> Self {
        Self {
            folder: folder.to_owned(),
            total,
            transferred: 0,
            logged_step: 0,
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    fn step(&self) -> u64 {
        if self.total == 0 {
            10
        } else {
            (self.transferred.saturating_mul(10) / self.total).min(10)
        }
    }
}

impl Progress for LogProgress {
    fn advance(&mut self, bytes: u64) {
        self.transferred = self.transferred.saturating_add(bytes);
        let step = self.step();
        if step > self.logged_step {
            self.logged_step = step;
            info!(
                "{}: {}% ({} of {} bytes)",
                self.folder,
                step * 10,
                self.transferred,
                self.total
            );
        } else {
            debug!("{}: {} bytes", self.folder, self.transferred);
        }
    }
}
