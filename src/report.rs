//! Dry-run report
//!
//! Puts the outcomes of the three reconcilers side by side and renders them
//! as text for a terminal or as JSON for other tools. Nothing here talks to
//! a remote system.

use crate::error::Result;
use crate::plan::{ConfigChange, FailedBinding, Outcome, RoleBindingPlan, SchemaPlan, TopicPlan};
use crate::remote::RoleBinding;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

/// How a report is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Counts per outcome
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    fn add(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

impl std::fmt::Display for OutcomeCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} failed",
            self.created, self.updated, self.unchanged, self.failed
        )
    }
}

/// Totals shown at the end of a report
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub topics: OutcomeCounts,
    pub schemas: OutcomeCounts,
    pub rolebindings: usize,
    pub failed_rolebindings: usize,
}

/// The combined plan of one reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub topics: TopicPlan,
    pub schemas: SchemaPlan,
    pub rolebindings: RoleBindingPlan,
    pub failed_rolebindings: Vec<FailedBinding>,
    pub summary: Summary,
}

impl Report {
    pub fn new(
        topics: TopicPlan,
        schemas: SchemaPlan,
        rolebindings: RoleBindingPlan,
        failed_rolebindings: Vec<FailedBinding>,
    ) -> Self {
        let mut summary = Summary {
            rolebindings: rolebindings.len(),
            failed_rolebindings: failed_rolebindings.len(),
            ..Default::default()
        };
        for outcome in topics.values() {
            summary.topics.add(&outcome.status());
        }
        for outcome in schemas.values() {
            summary.schemas.add(&outcome.status());
        }
        Self {
            generated_at: Utc::now(),
            topics,
            schemas,
            rolebindings,
            failed_rolebindings,
            summary,
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => Ok(self.render_text()),
            OutputFormat::Json => self.render_json(),
        }
    }

    pub fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human readable plan. Unchanged resources only show up in the summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Kafkalo plan generated at {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        let _ = writeln!(out, "\nTopics:");
        for (name, outcome) in &self.topics {
            let status = outcome.status();
            if status == Outcome::Unchanged {
                continue;
            }
            let _ = write!(out, "  {} {} ({})", marker(&status), name, status.label());
            if status == Outcome::Created {
                let _ = write!(
                    out,
                    " partitions={} replication_factor={}",
                    outcome.topic.partitions, outcome.topic.replication_factor
                );
            }
            if let Outcome::Failed { reason } = &status {
                let _ = write!(out, ": {}", reason);
            }
            out.push('\n');
            for (key, change) in &outcome.config_delta {
                match change {
                    ConfigChange::Added(value) => {
                        let _ = writeln!(out, "      {}: {}", key, value);
                    }
                    ConfigChange::Changed { before, after } => {
                        let _ = writeln!(out, "      {}: {} -> {}", key, before, after);
                    }
                }
            }
        }

        let _ = writeln!(out, "\nSchemas:");
        for (subject, outcome) in &self.schemas {
            let status = outcome.status();
            if status == Outcome::Unchanged {
                continue;
            }
            let _ = write!(out, "  {} {} ({})", marker(&status), subject, status.label());
            if let Outcome::Failed { reason } = &status {
                let _ = write!(out, ": {}", reason);
            }
            out.push('\n');
            if let Some(change) = &outcome.compatibility {
                let _ = writeln!(
                    out,
                    "      compatibility: {} -> {}",
                    change.before, change.after
                );
            }
            if let Some(reason) = &outcome.compatibility_error {
                let _ = writeln!(out, "      compatibility: FAILED {}", reason);
            }
        }

        let _ = writeln!(out, "\nRole bindings:");
        for binding in &self.rolebindings {
            for line in binding_lines(binding) {
                let _ = writeln!(out, "  + {}", line);
            }
        }
        for failed in &self.failed_rolebindings {
            for line in binding_lines(&failed.binding) {
                let _ = writeln!(out, "  ! {}: {}", line, failed.reason);
            }
        }

        let _ = writeln!(
            out,
            "\nSummary: topics {}; schemas {}; {} role binding(s), {} failed",
            self.summary.topics,
            self.summary.schemas,
            self.summary.rolebindings,
            self.summary.failed_rolebindings
        );
        out
    }
}

/// One line per resource pattern, without the marker
fn binding_lines(binding: &RoleBinding) -> Vec<String> {
    let clusters: Vec<String> = binding
        .scope
        .clusters
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    binding
        .resource_patterns
        .iter()
        .map(|pattern| {
            format!(
                "{} {} on {:?} {} ({:?}) [{}]",
                binding.principal,
                binding.role,
                pattern.resource_type,
                pattern.name,
                pattern.pattern_type,
                clusters.join(", ")
            )
        })
        .collect()
}

fn marker(status: &Outcome) -> char {
    match status {
        Outcome::Created => '+',
        Outcome::Updated => '~',
        Outcome::Unchanged => '=',
        Outcome::Failed { .. } => '!',
    }
}
