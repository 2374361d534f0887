#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};

/// Progress reporting for long loops over barcodes, groups and files.
#[cfg(feature = "cli")]
pub struct Progress {
    bar: ProgressBar,
}

#[cfg(feature = "cli")]
impl Progress {
    pub fn new(len: usize, message: &str) -> Self {
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(message.to_string());
        Self { bar }
    }

    pub fn inc(&self) {
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

// Without the CLI feature there is no terminal to draw on
#[cfg(not(feature = "cli"))]
pub struct Progress;

#[cfg(not(feature = "cli"))]
impl Progress {
    pub fn new(_len: usize, _message: &str) -> Self {
        Self
    }

    pub fn inc(&self) {}

    pub fn finish(&self) {}
}
