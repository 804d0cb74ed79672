//! Output formatting
//!
//! Successes go to stdout and failures to stderr, both in execution order.

use console::style;
use gantry_client::{ApplyResult, BatchObserver, BatchResultItem, DeleteResult};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// One line describing an apply outcome
pub fn apply_line(result: &ApplyResult, dry_run: bool) -> String {
    let suffix = if dry_run { " (dry run)" } else { "" };
    match &result.outcome {
        Ok(outcome) => format!(
            "{} {}: {}{}",
            style("✓").green().bold(),
            style(result.resource.key()).cyan(),
            outcome.upsert,
            suffix
        ),
        Err(e) => format!(
            "{} {}: {}",
            style("✗").red().bold(),
            style(result.resource.key()).cyan(),
            e
        ),
    }
}

/// One line describing a delete outcome
pub fn delete_line(result: &DeleteResult, dry_run: bool) -> String {
    match &result.outcome {
        Ok(()) if dry_run => format!(
            "{} {}: would be deleted (dry run)",
            style("-").yellow().bold(),
            style(result.resource.key()).cyan()
        ),
        Ok(()) => format!(
            "{} {}: Deleted",
            style("✓").green().bold(),
            style(result.resource.key()).cyan()
        ),
        Err(e) => format!(
            "{} {}: {}",
            style("✗").red().bold(),
            style(result.resource.key()).cyan(),
            e
        ),
    }
}

pub fn batch_line(item: &BatchResultItem) -> String {
    match &item.error {
        None => format!(
            "{} {}: {}",
            style("✓").green().bold(),
            style(item.label()).cyan(),
            item.upsert_result
                .map(|u| u.to_string())
                .unwrap_or_else(|| "Applied".to_string())
        ),
        Some(error) => format!(
            "{} {}: {}",
            style("✗").red().bold(),
            style(item.label()).cyan(),
            error
        ),
    }
}

/// Unified diff with added lines green and removed lines red
pub fn colorize_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") {
                style(line).bold().to_string()
            } else if line.starts_with('+') {
                style(line).green().to_string()
            } else if line.starts_with('-') {
                style(line).red().to_string()
            } else if line.starts_with("@@") {
                style(line).cyan().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn print_apply_results(results: &[ApplyResult], dry_run: bool) {
    for result in results {
        if result.is_success() {
            println!("{}", apply_line(result, dry_run));
        } else {
            eprintln!("{}", apply_line(result, dry_run));
        }
        if let Ok(outcome) = &result.outcome
            && let Some(diff) = &outcome.diff
        {
            println!("{}", colorize_diff(diff));
        }
    }
}

pub fn print_delete_results(results: &[DeleteResult], dry_run: bool) {
    for result in results {
        if result.is_success() {
            println!("{}", delete_line(result, dry_run));
        } else {
            eprintln!("{}", delete_line(result, dry_run));
        }
    }
}

/// Spinner that prints batch results as they arrive
pub struct BatchProgress {
    spinner: ProgressBar,
    print_diff: bool,
}

impl BatchProgress {
    pub fn new(count: usize, print_diff: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
            spinner.set_style(template);
        }
        spinner.set_message(format!("submitting {} resource(s)", count));
        spinner.enable_steady_tick(Duration::from_millis(120));
        Self { spinner, print_diff }
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl BatchObserver for BatchProgress {
    fn on_submitted(&self, token: &str) {
        self.spinner.set_message(format!("batch job {} running", token));
    }

    fn on_results(&self, results: &[BatchResultItem]) {
        self.spinner.suspend(|| {
            for item in results {
                if item.is_success() {
                    println!("{}", batch_line(item));
                } else {
                    eprintln!("{}", batch_line(item));
                }
                if self.print_diff
                    && let Some(diff) = &item.diff
                {
                    println!("{}", colorize_diff(diff));
                }
            }
        });
    }

    fn on_cancel_requested(&self) {
        self.spinner.set_message("cancelling, waiting for the server to stop the job");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_client::{ApplyOutcome, ClientError, UpsertResult};
    use gantry_core::Resource;
    use serde_json::json;

    fn resource() -> Resource {
        Resource::from_value(
            json!({"apiVersion": "v2", "kind": "Topic", "metadata": {"name": "orders"}}),
            "test",
        )
        .unwrap()
    }

    fn plain(text: String) -> String {
        console::strip_ansi_codes(&text).to_string()
    }

    #[test]
    fn test_apply_lines() {
        let ok = ApplyResult {
            resource: resource(),
            outcome: Ok(ApplyOutcome {
                upsert: UpsertResult::NotChanged,
                diff: None,
            }),
        };
        assert_eq!(plain(apply_line(&ok, true)), "✓ Topic/orders: NotChanged (dry run)");

        let failed = ApplyResult {
            resource: resource(),
            outcome: Err(ClientError::Api {
                status: 400,
                method: "PUT".to_string(),
                path: "/t".to_string(),
                message: "bad".to_string(),
            }),
        };
        assert_eq!(plain(apply_line(&failed, false)), "✗ Topic/orders: PUT /t failed with 400: bad");
    }

    #[test]
    fn test_delete_lines() {
        let ok = DeleteResult {
            resource: resource(),
            outcome: Ok(()),
        };
        assert_eq!(plain(delete_line(&ok, false)), "✓ Topic/orders: Deleted");
        assert_eq!(plain(delete_line(&ok, true)), "- Topic/orders: would be deleted (dry run)");
    }

    #[test]
    fn test_batch_line() {
        let item = BatchResultItem {
            original_path: Some("a.yaml".to_string()),
            kind: None,
            name: None,
            upsert_result: None,
            diff: None,
            error: Some("conflict".to_string()),
        };
        assert_eq!(plain(batch_line(&item)), "✗ a.yaml: conflict");
    }

    #[test]
    fn test_colorize_diff_keeps_text() {
        let diff = "--- a\n+++ b\n@@ -1 +1 @@\n-x\n+y";
        assert_eq!(plain(colorize_diff(diff)), diff);
    }
}
