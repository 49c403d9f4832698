//! One-shot and batch generation without the HTTP server.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::epc;
use crate::qr;
use crate::recolor;
use crate::validate::{self, Clean, Input};

#[derive(Debug, Default, Args)]
pub struct GenerateArgs {
    /// Receiver name.
    #[arg(long, default_value = "")]
    pub name: String,
    /// Payment scheme (defaults to epc_sct).
    #[arg(long, default_value = "")]
    pub scheme: String,
    /// Receiver IBAN.
    #[arg(long, default_value = "")]
    pub iban: String,
    /// Receiver BIC.
    #[arg(long, default_value = "")]
    pub bic: String,
    /// Amount in EUR (example: 49.90).
    #[arg(long, default_value = "")]
    pub amount: String,
    /// Amount format profile: eur_dot|eur_comma|eur_grouped_space_comma|eur_grouped_dot_comma|auto_eur_lenient.
    #[arg(long = "amount-format", default_value = "")]
    pub amount_format: String,
    /// Purpose code (defaults to GDDS).
    #[arg(long, default_value = "")]
    pub purpose: String,
    /// Structured remittance reference.
    #[arg(long = "remittance-reference", default_value = "")]
    pub remittance_reference: String,
    /// Unstructured remittance text.
    #[arg(long = "remittance-text", default_value = "")]
    pub remittance_text: String,
    /// Additional information.
    #[arg(long, default_value = "")]
    pub information: String,
    /// Path to a JSON batch input: an array or {"items":[...]}.
    #[arg(long, default_value = "")]
    pub input: String,
    /// Output file (single), output directory (batch png), or - for stdout.
    #[arg(long, default_value = "sepa-qr.png")]
    pub out: String,
    /// Output format: png|payload|json.
    #[arg(long, default_value = "png")]
    pub format: String,
}

#[derive(Debug, Serialize)]
struct BatchItem {
    index: usize,
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount_cents: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    out_file: String,
}

pub fn run_generate(args: &GenerateArgs) -> anyhow::Result<()> {
    let format = args.format.trim().to_lowercase();

    if !args.input.trim().is_empty() {
        return run_generate_batch(args.input.trim(), &args.out, &format);
    }

    let input = Input {
        scheme: args.scheme.clone(),
        name: args.name.clone(),
        iban: args.iban.clone(),
        bic: args.bic.clone(),
        amount: args.amount.clone(),
        amount_format: args.amount_format.clone(),
        purpose: args.purpose.clone(),
        remittance_reference: args.remittance_reference.clone(),
        remittance_text: args.remittance_text.clone(),
        information: args.information.clone(),
    };
    run_generate_one(&input, &args.out, &format)
}

fn run_generate_one(input: &Input, out: &str, format: &str) -> anyhow::Result<()> {
    let (cleaned, payload) = build_payload(input)?;

    match format {
        "payload" => {
            println!("{payload}");
            Ok(())
        }
        "json" => {
            let resp = serde_json::json!({
                "ok": true,
                "payload": payload,
                "amount_cents": cleaned.amount_cents,
            });
            println!("{}", serde_json::to_string(&resp)?);
            Ok(())
        }
        "png" => write_output(out, &standard_png(&payload)?),
        _ => bail!("invalid --format, use: png|payload|json"),
    }
}

fn run_generate_batch(input_path: &str, out: &str, format: &str) -> anyhow::Result<()> {
    let raw = fs::read(input_path).with_context(|| format!("read {input_path}"))?;
    let inputs = parse_batch_inputs(&raw)?;
    if inputs.is_empty() {
        bail!("input batch is empty");
    }

    if format == "png" {
        if out.trim() == "-" {
            bail!("batch png mode does not support --out -");
        }
        fs::create_dir_all(out).with_context(|| format!("create {out}"))?;
    }

    let mut items = Vec::with_capacity(inputs.len());
    let mut failures = 0usize;

    for (i, input) in inputs.iter().enumerate() {
        let (cleaned, payload) = match build_payload(input) {
            Ok(v) => v,
            Err(e) => {
                items.push(failed_item(i, e.to_string()));
                failures += 1;
                continue;
            }
        };

        let mut item = BatchItem {
            index: i,
            ok: true,
            payload,
            amount_cents: Some(cleaned.amount_cents),
            error: String::new(),
            out_file: String::new(),
        };

        if format == "png" {
            let png = match standard_png(&item.payload) {
                Ok(p) => p,
                Err(e) => {
                    items.push(failed_item(i, e.to_string()));
                    failures += 1;
                    continue;
                }
            };
            let file_path = Path::new(out).join(format!("sepa-qr-{}.png", i + 1));
            let file_path = file_path.to_string_lossy().to_string();
            if let Err(e) = write_output(&file_path, &png) {
                items.push(failed_item(i, e.to_string()));
                failures += 1;
                continue;
            }
            item.out_file = file_path;
        }
        items.push(item);
    }

    match format {
        "png" | "json" => {
            let resp = serde_json::json!({
                "ok": failures == 0,
                "total": items.len(),
                "succeeded": items.len() - failures,
                "failed": failures,
                "items": items,
            });
            println!("{}", serde_json::to_string(&resp)?);
        }
        "payload" => {
            for item in &items {
                if item.ok {
                    println!("#{}\n{}", item.index, item.payload);
                } else {
                    println!("#{} error: {}", item.index, item.error);
                }
            }
        }
        _ => bail!("invalid --format, use: png|payload|json"),
    }

    if failures > 0 {
        bail!("batch completed with {failures} failed item(s)");
    }
    Ok(())
}

fn failed_item(index: usize, error: String) -> BatchItem {
    BatchItem {
        index,
        ok: false,
        payload: String::new(),
        amount_cents: None,
        error,
        out_file: String::new(),
    }
}

fn build_payload(input: &Input) -> anyhow::Result<(Clean, String)> {
    let cleaned = validate::clean_and_validate(input).map_err(|e| anyhow!("{e}"))?;
    let payload = epc::build_payload(&cleaned)?;
    Ok((cleaned, payload))
}

/// The CLI always renders the standard public output: black modules on a
/// transparent background.
fn standard_png(payload: &str) -> anyhow::Result<Vec<u8>> {
    let mut png = qr::make_qr(payload, qr::default_public_options())?;
    if let Ok(recolored) = recolor::recolor(&png, "#000000", "transparent") {
        png = recolored;
    }
    Ok(png)
}

fn parse_batch_inputs(raw: &[u8]) -> anyhow::Result<Vec<Input>> {
    if let Ok(arr) = serde_json::from_slice::<Vec<Input>>(raw) {
        return Ok(arr);
    }

    #[derive(Debug, Deserialize)]
    struct Wrapped {
        items: Option<Vec<Input>>,
    }
    if let Ok(wrapped) = serde_json::from_slice::<Wrapped>(raw) {
        return wrapped
            .items
            .ok_or_else(|| anyhow!("invalid --input JSON: object must contain items array"));
    }

    bail!("invalid --input JSON: expected [] or {{\"items\":[]}}")
}

fn write_output(path: &str, data: &[u8]) -> anyhow::Result<()> {
    if path.trim() == "-" {
        std::io::stdout().write_all(data)?;
        return Ok(());
    }
    fs::write(path, data).with_context(|| format!("write {path}"))
}
