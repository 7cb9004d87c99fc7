//! Experiment commands.
//!
//! `show` fetches one experiment at a chosen shape and renders it as a tree;
//! `list` shows the caller's experiments, newest first.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ExperimentCommands {
    /// Show one experiment
    Show {
        /// Experiment ID
        id: Uuid,

        /// How much of the tree to load
        #[arg(short, long, value_enum, default_value = "shallow")]
        shape: ShapeArg,

        /// Maximum number of sequences
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List experiments owned by the principal
    List {
        /// Only experiments in this status (draft, designing, completed, archived)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShapeArg {
    /// The experiment record only
    Shallow,
    /// The experiment and its sequences
    Sequences,
    /// Sequences, guides and off-target sites
    Full,
}

impl ShapeArg {
    fn as_str(self) -> &'static str {
        match self {
            ShapeArg::Shallow => "shallow",
            ShapeArg::Sequences => "sequences",
            ShapeArg::Full => "full",
        }
    }
}

// ── API response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
struct ExperimentNode {
    id: Uuid,
    name: String,
    status: String,
    created_at: String,
    #[serde(default)]
    sequences: Option<Vec<SequenceNode>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct SequenceNode {
    id: Uuid,
    name: String,
    #[serde(default)]
    bases: String,
    #[serde(default)]
    guides: Option<Vec<GuideNode>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct GuideNode {
    id: Uuid,
    spacer: String,
    pam: String,
    strand: String,
    position: i64,
    efficiency_score: f64,
    #[serde(default)]
    off_targets: Vec<OffTargetNode>,
}

#[derive(Debug, Deserialize, Serialize)]
struct OffTargetNode {
    id: Uuid,
    chromosome: String,
    position: i64,
    strand: String,
    mismatches: i32,
    binding_score: f64,
}

#[derive(Debug, Serialize, Tabled)]
struct ExperimentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

fn show_path(id: Uuid, shape: ShapeArg, limit: Option<usize>) -> String {
    let mut path = format!("/api/v1/experiments/{}?shape={}", id, shape.as_str());
    if let Some(limit) = limit {
        path.push_str(&format!("&limit={}", limit));
    }
    path
}

fn list_path(status: Option<&str>, limit: Option<usize>) -> String {
    let mut params = Vec::new();
    if let Some(status) = status {
        params.push(format!("status={}", status));
    }
    if let Some(limit) = limit {
        params.push(format!("limit={}", limit));
    }
    if params.is_empty() {
        "/api/v1/experiments".to_string()
    } else {
        format!("/api/v1/experiments?{}", params.join("&"))
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: ExperimentCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        ExperimentCommands::Show { id, shape, limit } => {
            let view: serde_json::Value = client.get(&show_path(id, shape, limit)).await?;

            match format {
                OutputFormat::Table => {
                    let node: ExperimentNode =
                        serde_json::from_value(view).context("Unexpected experiment payload")?;
                    print_experiment_tree(&node);
                }
                _ => output::print_item(&view, format)?,
            }
        }

        ExperimentCommands::List { status, limit } => {
            let experiments: Vec<ExperimentNode> =
                client.get(&list_path(status.as_deref(), limit)).await?;

            let rows: Vec<ExperimentRow> = experiments
                .into_iter()
                .map(|e| ExperimentRow {
                    id: output::short_id(&e.id.to_string()),
                    name: e.name,
                    status: e.status,
                    created_at: e.created_at,
                })
                .collect();

            output::print_list(&rows, format)?;
        }
    }

    Ok(())
}

fn print_experiment_tree(experiment: &ExperimentNode) {
    output::print_header(&format!("Experiment: {}", experiment.name));
    output::print_detail("ID", &experiment.id.to_string());
    output::print_detail("Status", &experiment.status);
    output::print_detail("Created", &experiment.created_at);

    let Some(sequences) = &experiment.sequences else {
        return;
    };

    println!();
    if sequences.is_empty() {
        output::print_info("No sequences.");
        return;
    }

    for sequence in sequences {
        output::print_tree_node(
            1,
            &sequence.name,
            &format!("{} ({} bp)", output::short_id(&sequence.id.to_string()), sequence.bases.len()),
        );

        let Some(guides) = &sequence.guides else {
            continue;
        };
        for guide in guides {
            output::print_tree_node(
                2,
                &guide.spacer,
                &format!(
                    "{} {}{} pam={} score={:.3}",
                    output::short_id(&guide.id.to_string()),
                    guide.strand,
                    guide.position,
                    guide.pam,
                    guide.efficiency_score
                ),
            );
            for site in &guide.off_targets {
                output::print_tree_node(
                    3,
                    &format!("{}:{}{}", site.chromosome, site.strand, site.position),
                    &format!("mismatches={} score={:.3}", site.mismatches, site.binding_score),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_path() {
        let id = Uuid::nil();
        assert_eq!(
            show_path(id, ShapeArg::Full, Some(5)),
            "/api/v1/experiments/00000000-0000-0000-0000-000000000000?shape=full&limit=5"
        );
        assert_eq!(
            show_path(id, ShapeArg::Shallow, None),
            "/api/v1/experiments/00000000-0000-0000-0000-000000000000?shape=shallow"
        );
    }

    #[test]
    fn test_list_path() {
        assert_eq!(list_path(None, None), "/api/v1/experiments");
        assert_eq!(
            list_path(Some("completed"), Some(10)),
            "/api/v1/experiments?status=completed&limit=10"
        );
    }

    #[test]
    fn test_full_payload_parses() {
        let payload = serde_json::json!({
            "id": "6a1f9a8e-5b7c-4d2e-9f10-1a2b3c4d5e6f",
            "principal_id": "alice",
            "name": "BRCA1 knockout",
            "status": "designing",
            "created_at": "2026-03-01T12:00:00Z",
            "updated_at": "2026-03-01T12:00:00Z",
            "sequences": [{
                "id": "7b2f9a8e-5b7c-4d2e-9f10-1a2b3c4d5e6f",
                "experiment_id": "6a1f9a8e-5b7c-4d2e-9f10-1a2b3c4d5e6f",
                "name": "exon 11",
                "bases": "ACGTACGT",
                "created_at": "2026-03-01T12:00:00Z",
                "updated_at": "2026-03-01T12:00:00Z",
                "guides": [{
                    "id": "8c3f9a8e-5b7c-4d2e-9f10-1a2b3c4d5e6f",
                    "sequence_id": "7b2f9a8e-5b7c-4d2e-9f10-1a2b3c4d5e6f",
                    "spacer": "GACGTTACGATCGATCGATC",
                    "pam": "NGG",
                    "strand": "+",
                    "position": 120,
                    "efficiency_score": 0.91,
                    "created_at": "2026-03-01T12:00:00Z",
                    "off_targets": []
                }]
            }]
        });

        let node: ExperimentNode = serde_json::from_value(payload).unwrap();
        let sequences = node.sequences.unwrap();
        assert_eq!(sequences.len(), 1);
        let guides = sequences[0].guides.as_ref().unwrap();
        assert_eq!(guides[0].position, 120);
        assert!(guides[0].off_targets.is_empty());
    }

    #[test]
    fn test_shallow_payload_has_no_sequences() {
        let payload = serde_json::json!({
            "id": "6a1f9a8e-5b7c-4d2e-9f10-1a2b3c4d5e6f",
            "name": "BRCA1 knockout",
            "status": "draft",
            "created_at": "2026-03-01T12:00:00Z"
        });
        let node: ExperimentNode = serde_json::from_value(payload).unwrap();
        assert!(node.sequences.is_none());
    }
}
