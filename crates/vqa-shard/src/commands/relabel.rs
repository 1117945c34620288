//! `relabel`: give every record of an existing input file the same label.
use std::{path::PathBuf, process::ExitCode};

use anyhow::{Result, bail};
use clap::Args;
use serde_json::Value;
use tracing::info;
use vqa_core::fsio;

use super::ingest::DEFAULT_LABEL;

#[derive(Args, Debug)]
pub struct RelabelCommand {
    /// Input file (JSON array of records) to rewrite
    pub input: PathBuf,

    /// New label for every record
    #[arg(short, long, default_value = DEFAULT_LABEL)]
    pub label: String,

    /// Write the result here instead of replacing the input file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn execute(cmd: RelabelCommand) -> Result<ExitCode> {
    let mut records: Value = fsio::read_json(&cmd.input)?;
    let Some(list) = records.as_array_mut() else {
        bail!("{} is not a JSON array of records", cmd.input.display());
    };
    let updated = relabel(list, &cmd.label);

    let output = cmd.output.as_ref().unwrap_or(&cmd.input);
    fsio::write_json_atomic(output, &records)?;
    info!(
        target: "vqa.shard.relabel",
        output = %output.display(),
        updated,
        label = %cmd.label,
        "labels replaced"
    );
    Ok(ExitCode::SUCCESS)
}

/// Replace the labels of every object record that carries one and return how many changed.
///
/// `label` is overwritten in place and a `labels` list becomes `[label]`. Records without
/// either key, and non-object entries, are left alone. Key order is kept.
pub fn relabel(records: &mut [Value], label: &str) -> usize {
    let mut updated = 0;
    for record in records.iter_mut().filter_map(Value::as_object_mut) {
        let mut touched = false;
        if let Some(v) = record.get_mut("label") {
            *v = Value::from(label);
            touched = true;
        }
        if let Some(v) = record.get_mut("labels") {
            *v = Value::from(vec![label]);
            touched = true;
        }
        updated += usize::from(touched);
    }
    updated
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn only_records_with_labels_change() {
        let mut records = vec![
            json!({"video": "a.mp4", "label": "pan", "split": "train"}),
            json!({"video": "b.mp4", "labels": ["pan", "tilt"]}),
            json!({"video": "c.mp4"}),
            json!("not a record"),
        ];

        assert_eq!(relabel(&mut records, "zoom"), 2);
        assert_eq!(records[0], json!({"video": "a.mp4", "label": "zoom", "split": "train"}));
        assert_eq!(records[1]["labels"], json!(["zoom"]));
        assert_eq!(records[2], json!({"video": "c.mp4"}));
        assert_eq!(records[3], json!("not a record"));

        let keys: Vec<&String> = records[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["video", "label", "split"]);
    }

    #[test]
    fn rewrites_the_input_file_in_place() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.json");
        std::fs::write(&input, br#"[{"video": "a.mp4", "label": "pan"}]"#).unwrap();

        execute(RelabelCommand {
            input: input.clone(),
            label: "tilt".into(),
            output: None,
        })
        .unwrap();

        let records: Vec<Value> = fsio::read_json(&input).unwrap();
        assert_eq!(records, vec![json!({"video": "a.mp4", "label": "tilt"})]);
    }

    #[test]
    fn non_array_input_is_refused_and_left_untouched() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.json");
        std::fs::write(&input, br#"{"video": "a.mp4", "label": "pan"}"#).unwrap();

        let err = execute(RelabelCommand {
            input: input.clone(),
            label: "tilt".into(),
            output: Some(dir.path().join("out.json")),
        })
        .unwrap_err();
        assert!(err.to_string().contains("not a JSON array"));
        assert!(!dir.path().join("out.json").exists());
        assert_eq!(
            std::fs::read(&input).unwrap(),
            br#"{"video": "a.mp4", "label": "pan"}"#
        );
    }
}
