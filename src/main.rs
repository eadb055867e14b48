mod archive;
mod config;
mod dates;
mod extract_client;
mod file_store;
mod invoice_store;
mod pipeline;
mod report;
mod text_extract;

use std::path::Path;

use config::Config;
use extract_client::OpenAiExtractor;
use file_store::FileStore;
use invoice_store::{Earning, InvoiceEdit, InvoiceStore};
use pipeline::IngestionPipeline;
use text_extract::PdfTextSource;
use tracing::info;

const CONFIG_PATH: &str = ".config/invoice_desk.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let cfg = Config::load_or_default(CONFIG_PATH)?;
    if let Some(parent) = Path::new(&cfg.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = InvoiceStore::new(&cfg.db_path)?;
    let files = FileStore::new(&cfg.uploads_dir)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();

    match argv.as_slice() {
        ["ingest", paths @ ..] if !paths.is_empty() => {
            let extractor = OpenAiExtractor::new(&cfg.openai, cfg.api_key()?)?;
            let text_source = PdfTextSource;
            let pipeline = IngestionPipeline::new(
                &files,
                &db,
                &text_source,
                &extractor,
                &cfg.workflow.initial_status,
            );
            for &path in paths {
                let bytes = std::fs::read(path)?;
                let filename = Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string());
                info!(path = %path, bytes = bytes.len(), "Ingesting document");
                let invoice = pipeline.ingest(&bytes, &filename).await?;
                println!("{}", serde_json::to_string_pretty(&invoice)?);
            }
        }
        ["list"] => {
            println!("{}", serde_json::to_string_pretty(&db.find_all()?)?);
        }
        ["edit", id, body] => {
            let edit: InvoiceEdit = serde_json::from_str(body)?;
            match db.update(id.parse()?, &edit)? {
                Some(invoice) => println!("{}", serde_json::to_string_pretty(&invoice)?),
                None => println!("No invoice with id {id}"),
            }
        }
        ["status", id, status] => match db.update_status(id.parse()?, status)? {
            Some(invoice) => println!("{}", serde_json::to_string_pretty(&invoice)?),
            None => println!("No invoice with id {id}"),
        },
        ["delete", id] => {
            if db.delete_by_id(id.parse()?)? {
                println!("Deleted invoice {id}");
            } else {
                println!("No invoice with id {id}");
            }
        }
        ["report", start, end, out] => {
            let (start, end) = parse_range(start, end)?;
            let rendered = report::render_pdf(&report::build_report(&db, start, end)?)?;
            std::fs::write(*out, &rendered)?;
            info!(out = %out, bytes = rendered.len(), "Report written");
        }
        ["bundle", start, end, out] => {
            let (start, end) = parse_range(start, end)?;
            let bytes = archive::bundle(&db, &files, start, end)?;
            std::fs::write(*out, &bytes)?;
            info!(out = %out, bytes = bytes.len(), "Archive written");
        }
        ["file", stored_name, out] => match files.retrieve(stored_name) {
            Some(bytes) => {
                std::fs::write(*out, &bytes)?;
                info!(out = %out, bytes = bytes.len(), "Original written");
            }
            None => println!("No stored file named {stored_name}"),
        },
        ["earning", "add", date, amount, source] => {
            let earning = Earning {
                id: None,
                date: dates::parse_iso(date).ok_or_else(|| format!("invalid date: {date}"))?,
                amount: amount.parse()?,
                source: source.to_string(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&db.insert_earning(&earning)?)?
            );
        }
        ["earning", "list"] => {
            println!(
                "{}",
                serde_json::to_string_pretty(&db.earnings_newest_first()?)?
            );
        }
        ["earning", "delete", id] => {
            if db.delete_earning(id.parse()?)? {
                println!("Deleted earning {id}");
            } else {
                println!("No earning with id {id}");
            }
        }
        _ => usage(),
    }

    Ok(())
}

fn parse_range(
    start: &str,
    end: &str,
) -> Result<(time::Date, time::Date), Box<dyn std::error::Error>> {
    let start = dates::parse_iso(start).ok_or_else(|| format!("invalid start date: {start}"))?;
    let end = dates::parse_iso(end).ok_or_else(|| format!("invalid end date: {end}"))?;
    Ok((start, end))
}

fn usage() {
    println!(
        "usage: invoice_desk <command>

  ingest <pdf>...                 upload and analyze documents
  list                            all invoices as JSON
  edit <id> <json>                apply a full-record edit
  status <id> <status>            change workflow status
  delete <id>                     remove an invoice record
  report <start> <end> <out.pdf>  payment report for a date range
  bundle <start> <end> <out.zip>  report + original files archive
  file <stored_name> <out>        fetch a stored original
  earning add <date> <amt> <src>  record a cash intake
  earning list                    all earnings, newest first
  earning delete <id>             remove an earning

dates are ISO (YYYY-MM-DD); config read from {CONFIG_PATH}"
    );
}
