//! Host-side artifact writer.
//!
//! Writes one JSON manifest per bucket (`<bucket>.json`), the input a
//! language renderer consumes, plus a human-readable `SUMMARY.txt`.

use crate::buffer_pool;
use crate::issues::{Issue, Severity};
use crate::split::Bucket;
use crate::{GenerationOutput, GenerationStats};
use anyhow::{Context as _, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

pub const SUMMARY_FILE: &str = "SUMMARY.txt";

const SUMMARY_TEMPLATE: &str = include_str!("../templates/summary.txt.tera");

#[derive(Serialize)]
struct BucketRow {
    file: String,
    shared: bool,
    operations: usize,
    types: usize,
    lines: usize,
}

#[derive(Serialize)]
struct IssueRow<'a> {
    severity: Severity,
    message: &'a str,
    location: Option<&'a str>,
}

#[derive(Serialize)]
struct StatsRow {
    files: usize,
    types: usize,
    operations: usize,
    declarations: usize,
    elapsed_ms: u64,
}

impl From<&GenerationStats> for StatsRow {
    fn from(stats: &GenerationStats) -> Self {
        Self {
            files: stats.files,
            types: stats.types,
            operations: stats.operations,
            declarations: stats.declarations,
            elapsed_ms: stats.elapsed_ms(),
        }
    }
}

pub fn manifest_name(bucket: &Bucket) -> String {
    format!("{}.json", bucket.name)
}

/// Render the run summary.
pub fn render_summary(output: &GenerationOutput) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template("summary.txt", SUMMARY_TEMPLATE)
        .context("Failed to load summary template")?;

    let buckets: Vec<BucketRow> = output
        .plan
        .buckets
        .iter()
        .map(|bucket| BucketRow {
            file: manifest_name(bucket),
            shared: bucket.shared,
            operations: bucket.operations.len(),
            types: bucket.types,
            lines: bucket.lines,
        })
        .collect();
    let issues: Vec<IssueRow> = output.issues.iter().map(issue_row).collect();

    let mut context = Context::new();
    context.insert("stats", &StatsRow::from(&output.stats));
    context.insert("buckets", &buckets);
    context.insert("issues", &issues);

    tera.render("summary.txt", &context)
        .context("Failed to render summary")
}

fn issue_row(issue: &Issue) -> IssueRow<'_> {
    IssueRow {
        severity: issue.severity,
        message: &issue.message,
        location: issue.location.as_deref(),
    }
}

/// Write every bucket manifest and the summary into `dir`, creating it if
/// needed. Returns the written paths, manifests first.
pub fn write_artifacts(output: &GenerationOutput, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {:?}", dir))?;

    let pool = buffer_pool::global();
    let mut written = Vec::with_capacity(output.plan.buckets.len() + 1);
    for bucket in &output.plan.buckets {
        let path = dir.join(manifest_name(bucket));
        // ~40 bytes of JSON per estimated source line
        let mut buf = pool.acquire(bucket.lines * 40);
        serde_json::to_writer_pretty(&mut *buf, bucket)
            .with_context(|| format!("Failed to serialize bucket '{}'", bucket.name))?;
        buf.push(b'\n');
        fs::write(&path, &*buf)
            .with_context(|| format!("Failed to write output file: {:?}", path))?;
        tracing::debug!(path = %path.display(), bytes = buf.len(), "wrote manifest");
        written.push(path);
    }

    let summary = render_summary(output)?;
    let path = dir.join(SUMMARY_FILE);
    fs::write(&path, summary).with_context(|| format!("Failed to write output file: {:?}", path))?;
    written.push(path);

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{generate, GenerationOptions, SourceDocument};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn output() -> GenerationOutput {
        let doc = SourceDocument::from_value(
            json!({
                "openapi": "3.0.3",
                "info": { "title": "t", "version": "1" },
                "paths": {
                    "/pets": {
                        "get": {
                            "tags": ["pets"],
                            "responses": { "200": { "description": "ok" } }
                        }
                    }
                }
            }),
            None,
        )
        .unwrap();
        generate(&doc, &GenerationOptions::default()).unwrap()
    }

    #[test]
    fn test_writes_manifest_per_bucket_and_summary() {
        let output = output();
        let dir = TempDir::new().unwrap();
        let written = write_artifacts(&output, dir.path()).unwrap();

        assert_eq!(written.len(), output.plan.buckets.len() + 1);
        assert!(dir.path().join("pets.json").exists());
        assert!(dir.path().join("shared.json").exists());

        let manifest: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("pets.json")).unwrap()).unwrap();
        assert_eq!(manifest["key"], "pets");
        assert_eq!(manifest["operations"][0], "GetPets");
    }

    #[test]
    fn test_summary_lists_counts_and_issues() {
        let output = output();
        let summary = render_summary(&output).unwrap();
        assert!(summary.contains("Operations:   1"));
        assert!(summary.contains("pets.json: 1 operations"));
        assert!(summary.contains("shared.json (shared)"));
        // the missing operation id is reported
        assert!(summary.contains("[info] missing operationId"));
        assert!(summary.contains("(GET /pets)"));
    }
}
