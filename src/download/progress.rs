use std::time::{Duration, Instant};

use indicatif::{HumanBytes, HumanDuration, ProgressBar};

const REFRESH: Duration = Duration::from_secs(1);

pub fn transfer_message(downloaded: u64, total: Option<u64>, speed: u64, elapsed: Duration) -> String {
    match total {
        Some(len) => format!(
            "Downloaded {}/{}. Speed: {}/s. Time Elapsed: {}.",
            HumanBytes(downloaded),
            HumanBytes(len),
            HumanBytes(speed),
            HumanDuration(elapsed),
        ),
        None => format!(
            "Downloaded {}. Speed: {}/s. Time Elapsed: {}.",
            HumanBytes(downloaded),
            HumanBytes(speed),
            HumanDuration(elapsed),
        ),
    }
}

/// Spinner reporting bytes, speed and elapsed time of one file transfer.
/// Speed only counts bytes fetched in this run, not resumed ones.
pub struct TransferProgress {
    bar: ProgressBar,
    start: Instant,
    last_update: Instant,
    resumed_from: u64,
    total: Option<u64>,
}

impl TransferProgress {
    pub fn new(bar: ProgressBar) -> Self {
        let now = Instant::now();
        Self {
            bar,
            start: now,
            last_update: now,
            resumed_from: 0,
            total: None,
        }
    }

    pub fn spinner() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(100));
        Self::new(bar)
    }

    pub fn hidden() -> Self {
        Self::new(ProgressBar::hidden())
    }

    /// Called at the start of every attempt.
    pub fn restart(&mut self, resumed_from: u64, total: Option<u64>) {
        self.resumed_from = resumed_from;
        self.total = total;
        if resumed_from > 0 {
            self.bar
                .set_message(format!("Resuming from {}.", HumanBytes(resumed_from)));
        }
    }

    fn speed(&self, downloaded: u64) -> u64 {
        downloaded.saturating_sub(self.resumed_from) / self.start.elapsed().as_secs().max(1)
    }

    pub fn update(&mut self, downloaded: u64) {
        if self.last_update.elapsed() < REFRESH {
            return;
        }
        self.bar.set_message(transfer_message(
            downloaded,
            self.total,
            self.speed(downloaded),
            self.start.elapsed(),
        ));
        self.last_update = Instant::now();
    }

    pub fn finish(&self, downloaded: u64) {
        self.bar.finish_with_message(format!(
            "Downloaded {} at {}/s in {}.",
            HumanBytes(downloaded.saturating_sub(self.resumed_from)),
            HumanBytes(self.speed(downloaded)),
            HumanDuration(self.start.elapsed())
        ));
    }

    pub fn abandon(&self, downloaded: u64) {
        match self.total {
            Some(len) => self.bar.abandon_with_message(format!(
                "Download interrupted at {}/{}.",
                HumanBytes(downloaded),
                HumanBytes(len),
            )),
            None => self.bar.abandon_with_message(format!(
                "Download interrupted at {}",
                HumanBytes(downloaded)
            )),
        }
    }
}
