// SPDX-License-Identifier: Apache-2.0
//! Developer CLI for the container codec: `encode`, `decode`, `convert`.
//!
//! Every subcommand maps its failure to one of three exit codes: `1` for a
//! user error (bad arguments, malformed input document), `2` for an I/O
//! failure, `3` for a format error (the bytes aren't a valid container).
//! `0` means success. See [`exit_code_for`].

#![deny(rust_2018_idioms)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro
)]
// The CLI is expected to print to stdout/stderr.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use xrai_container::{DecodeOptions, Decoder, Document, EncodeOptions, Encoder, Payload, ValidationResult};

#[derive(Parser, Debug)]
#[command(name = "xrai", author, version, about = "Container codec for XRAI scene files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a JSON document description into a container file.
    Encode {
        /// JSON file describing the document (section name -> payload).
        src: PathBuf,
        /// Container file to write.
        out: PathBuf,
        /// Attempt per-section deflate compression, subject to the benefit gate.
        #[arg(long)]
        compress: bool,
        /// Deflate level, 1 (fastest) to 9 (smallest).
        #[arg(long, default_value_t = 6)]
        compression_level: u32,
        /// Override `metadata.asset.type`.
        #[arg(long)]
        r#type: Option<String>,
        /// JSON file to merge into the metadata section before encoding.
        #[arg(long)]
        metadata: Option<PathBuf>,
    },
    /// Parse a container file and report on or extract its contents.
    Decode {
        /// Container file to read.
        input: PathBuf,
        /// Write each section's payload into this directory instead of
        /// printing the whole document to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print format version and section sizes instead of the document.
        #[arg(long)]
        info: bool,
        /// Print only the metadata section.
        #[arg(long)]
        metadata: bool,
        /// Only run structural validation; print valid/invalid and exit 3 on invalid.
        #[arg(long)]
        validate: bool,
    },
    /// Transcode between the binary container and its JSON document form.
    Convert {
        /// Input file.
        input: PathBuf,
        /// Output file.
        output: PathBuf,
        /// Input format.
        #[arg(long, value_enum)]
        from: Format,
        /// Output format.
        #[arg(long, value_enum)]
        to: Format,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// The binary XRAI container.
    Xrai,
    /// A single JSON file: section name -> JSON payload, with opaque
    /// sections wrapped as `{"__opaque_hex": "..."}`.
    Json,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Map a failure to the CLI's exit-code contract: 1 user error, 2 I/O
/// error, 3 format error. Library errors that indicate a malformed
/// container map to 3; everything from `std::io` maps to 2; anything else
/// (bad CLI input, a document that can't be encoded) maps to 1.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(codec_err) = err.chain().find_map(|e| e.downcast_ref::<xrai_container::Error>()) {
        return match codec_err {
            xrai_container::Error::Io(_) => 2,
            xrai_container::Error::EncoderInputInvalid { .. } => 1,
            _ => 3,
        };
    }
    if err.chain().any(|e| e.downcast_ref::<std::io::Error>().is_some()) {
        return 2;
    }
    1
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Encode {
            src,
            out,
            compress,
            compression_level,
            r#type,
            metadata,
        } => cmd_encode(&src, &out, compress, compression_level, r#type.as_deref(), metadata.as_deref()),
        Command::Decode {
            input,
            output,
            info,
            metadata,
            validate,
        } => cmd_decode(&input, output.as_deref(), info, metadata, validate),
        Command::Convert { input, output, from, to } => cmd_convert(&input, &output, from, to),
    }
}

fn cmd_encode(
    src: &Path,
    out: &Path,
    compress: bool,
    compression_level: u32,
    type_override: Option<&str>,
    metadata_patch: Option<&Path>,
) -> anyhow::Result<()> {
    let text = fs::read_to_string(src).with_context(|| format!("reading {}", src.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text).with_context(|| format!("parsing {} as JSON", src.display()))?;
    let mut doc = json_to_document(value)?;

    if let Some(patch_path) = metadata_patch {
        let patch_text = fs::read_to_string(patch_path).with_context(|| format!("reading {}", patch_path.display()))?;
        let patch: serde_json::Value =
            serde_json::from_str(&patch_text).with_context(|| format!("parsing {} as JSON", patch_path.display()))?;
        merge_metadata(&mut doc, patch)?;
    }
    if let Some(asset_type) = type_override {
        set_metadata_field(&mut doc, "type", serde_json::Value::String(asset_type.to_string()))?;
    }

    let opts = EncodeOptions {
        compress,
        compression_level,
        ..EncodeOptions::default()
    };
    let bytes = Encoder::new().encode(&doc, &opts).map_err(anyhow::Error::from)?;
    fs::write(out, bytes).with_context(|| format!("writing {}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}

fn cmd_decode(input: &Path, output: Option<&Path>, info: bool, metadata_only: bool, validate_only: bool) -> anyhow::Result<()> {
    let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;

    if validate_only {
        return match Decoder::new().validate(&bytes) {
            ValidationResult::Valid => {
                println!("valid");
                Ok(())
            }
            ValidationResult::Invalid(errors) => {
                for error in &errors {
                    eprintln!("{error}");
                }
                match errors.into_iter().next() {
                    Some(first) => Err(anyhow::Error::from(first)),
                    None => bail!("validation reported invalid with no errors"),
                }
            }
        };
    }

    let doc = Decoder::new()
        .decode(&bytes, &DecodeOptions::default())
        .map_err(anyhow::Error::from)?;

    if info {
        let format = doc.format.context("decoded document is missing format info")?;
        println!("version: {}", format.version_string());
        println!("sections: {}", doc.len());
        for (name, payload) in doc.iter() {
            let size = match payload {
                Payload::Json(v) => serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0),
                Payload::Opaque(b) => b.len(),
            };
            println!("  {name}: {size} bytes");
        }
        if !doc.warnings.is_empty() {
            println!("warnings:");
            for warning in &doc.warnings {
                println!("  section {}: {}", warning.type_id, warning.message);
            }
        }
        return Ok(());
    }

    if metadata_only {
        let metadata = doc.metadata().context("document has no metadata section")?;
        println!("{}", serde_json::to_string_pretty(metadata)?);
        return Ok(());
    }

    match output {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            for (name, payload) in doc.iter() {
                match payload {
                    Payload::Json(value) => {
                        let path = dir.join(format!("{name}.json"));
                        fs::write(&path, serde_json::to_vec_pretty(value)?).with_context(|| format!("writing {}", path.display()))?;
                    }
                    Payload::Opaque(bytes) => {
                        let path = dir.join(format!("{name}.bin"));
                        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
                    }
                }
            }
            println!("wrote {} sections to {}", doc.len(), dir.display());
        }
        None => {
            let value = document_to_json(&doc);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

fn cmd_convert(input: &Path, output: &Path, from: Format, to: Format) -> anyhow::Result<()> {
    match (from, to) {
        (Format::Xrai, Format::Json) => {
            let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
            let doc = Decoder::new()
                .decode(&bytes, &DecodeOptions::default())
                .map_err(anyhow::Error::from)?;
            let value = document_to_json(&doc);
            fs::write(output, serde_json::to_vec_pretty(&value)?).with_context(|| format!("writing {}", output.display()))?;
        }
        (Format::Json, Format::Xrai) => {
            let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)?;
            let doc = json_to_document(value)?;
            let bytes = Encoder::new().encode(&doc, &EncodeOptions::default()).map_err(anyhow::Error::from)?;
            fs::write(output, bytes).with_context(|| format!("writing {}", output.display()))?;
        }
        (Format::Xrai, Format::Xrai) | (Format::Json, Format::Json) => {
            bail!("--from and --to must differ");
        }
    }
    println!("wrote {}", output.display());
    Ok(())
}

const OPAQUE_HEX_KEY: &str = "__opaque_hex";

/// Render a decoded document as a single JSON value: section name -> JSON
/// payload, opaque sections wrapped as `{"__opaque_hex": "<hex>"}`.
fn document_to_json(doc: &Document) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, payload) in doc.iter() {
        let value = match payload {
            Payload::Json(v) => v.clone(),
            Payload::Opaque(bytes) => {
                serde_json::json!({ OPAQUE_HEX_KEY: hex::encode(bytes) })
            }
        };
        map.insert(name.to_string(), value);
    }
    serde_json::Value::Object(map)
}

/// Parse a document description produced by [`document_to_json`] (or
/// hand-written) back into a [`Document`].
fn json_to_document(value: serde_json::Value) -> anyhow::Result<Document> {
    let serde_json::Value::Object(map) = value else {
        bail!("document description must be a JSON object");
    };
    let mut doc = Document::new();
    for (name, section) in map {
        let payload = match section.as_object().and_then(|o| o.get(OPAQUE_HEX_KEY)) {
            Some(serde_json::Value::String(hex_str)) => {
                let bytes = hex::decode(hex_str).with_context(|| format!("section {name}: invalid hex"))?;
                Payload::Opaque(bytes)
            }
            _ => Payload::Json(section),
        };
        doc.insert(name, payload);
    }
    Ok(doc)
}

fn merge_metadata(doc: &mut Document, patch: serde_json::Value) -> anyhow::Result<()> {
    let serde_json::Value::Object(patch_obj) = patch else {
        bail!("--metadata file must contain a JSON object");
    };
    let mut metadata = match doc.remove("metadata") {
        Some(Payload::Json(v)) => v,
        Some(Payload::Opaque(_)) => bail!("metadata section must be JSON to merge a patch into it"),
        None => serde_json::json!({}),
    };
    let obj = metadata.as_object_mut().context("metadata section root must be a JSON object")?;
    for (key, value) in patch_obj {
        obj.insert(key, value);
    }
    doc.insert("metadata", Payload::Json(metadata));
    Ok(())
}

fn set_metadata_field(doc: &mut Document, field: &str, value: serde_json::Value) -> anyhow::Result<()> {
    let mut metadata = match doc.remove("metadata") {
        Some(Payload::Json(v)) => v,
        Some(Payload::Opaque(_)) => bail!("metadata section must be JSON to set a field on it"),
        None => serde_json::json!({}),
    };
    let obj = metadata.as_object_mut().context("metadata section root must be a JSON object")?;
    let asset = obj.entry("asset").or_insert_with(|| serde_json::json!({}));
    let asset_obj = asset.as_object_mut().context("metadata.asset must be a JSON object")?;
    asset_obj.insert(field.to_string(), value);
    doc.insert("metadata", Payload::Json(metadata));
    Ok(())
}
