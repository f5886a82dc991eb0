//! Console status reporting for deployment steps

use crate::error::DeployError;
use colored::Colorize;
use std::future::Future;
use std::io::Write;

/// Completion markers are aligned to the next multiple of this width
pub const STATUS_ALIGN_SPACING: usize = 6;

/// Prints a label, runs the wrapped operation, then prints a colored
/// pass/fail marker
///
/// The operation's result is returned as-is; callers decide whether a
/// failure aborts the run. Nothing is swallowed here.
pub struct StatusReporter {
    enabled: bool,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// Reporter that prints nothing; used in tests
    pub fn silent() -> Self {
        Self { enabled: false }
    }

    /// Run one fallible step under a status line
    pub async fn run<T, F>(&self, label: &str, op: F) -> Result<T, DeployError>
    where
        F: Future<Output = Result<T, DeployError>>,
    {
        if self.enabled {
            print!("{label}");
            let _ = std::io::stdout().flush();
        }

        let pad = " ".repeat(pad_width(label));
        match op.await {
            Ok(value) => {
                if self.enabled {
                    println!("{pad}{}", "Done!".green());
                }
                Ok(value)
            }
            Err(error) => {
                if self.enabled {
                    println!("{pad}{}", "Failed.".red());
                    println!(
                        "{} {}",
                        "ERROR:".yellow().bold(),
                        error.to_string().bold()
                    );
                }
                Err(error)
            }
        }
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn pad_width(label: &str) -> usize {
    (STATUS_ALIGN_SPACING - label.len() % STATUS_ALIGN_SPACING) % STATUS_ALIGN_SPACING
}
