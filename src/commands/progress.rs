// src/commands/progress.rs
//! Terminal progress for transaction execution

use goalpost::progress::{ItemPhase, TransactionProgress};
use goalpost::transaction::TransactionPackage;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Overall progress bar with one printed line per finished item
pub struct TransactionBar {
    bar: ProgressBar,
}

impl TransactionBar {
    pub fn new(total_items: u64) -> Self {
        let bar = ProgressBar::new(total_items);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:40} ({pos}/{len}) [{bar:30.green/dim}] {percent}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl TransactionProgress for TransactionBar {
    fn item(&self, item: &TransactionPackage, phase: ItemPhase, _percent: u8) {
        match phase {
            ItemPhase::Starting => {
                self.bar
                    .set_message(format!("{} {}", item.action.label(), item.package.name()));
            }
            ItemPhase::Applied => {
                self.bar
                    .println(format!("  {:<12} {}", item.action.label(), item.package));
                self.bar.inc(1);
            }
            ItemPhase::Failed => {
                self.bar
                    .println(format!("  {:<12} {} [FAILED]", item.action.label(), item.package));
            }
        }
    }
}
