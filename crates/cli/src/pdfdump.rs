//! pdfdump - Inspect PDF cross-reference structure as JSON.
//!
//! A command line tool for dumping the xref table, trailer, revision
//! history, and individual objects of a PDF file.

use clap::{ArgAction, Parser};
use memmap2::Mmap;
use serde::Serialize;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use vellum_core::{
    MemoryLimitsAwareHandler, PdfDocument, PdfObject, PdfRef, SlotState, XrefOrigin,
};

/// A command line tool for dumping PDF cross-reference structure.
#[derive(Parser, Debug)]
#[command(name = "pdfdump")]
#[command(author, version, about = "Inspect PDF cross-reference structure", long_about = None)]
struct Args {
    /// One or more paths to PDF files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,

    /// Comma-separated list of object IDs to dump
    #[arg(short = 'i', long = "objects")]
    objects: Option<String>,

    /// Dump every object the xref table knows
    #[arg(short = 'a', long = "all", action = ArgAction::SetTrue)]
    all: bool,

    /// Dump the incremental revision history
    #[arg(short = 'r', long = "revisions", action = ArgAction::SetTrue)]
    revisions: bool,

    /// Decode stream bodies through their filter chains
    #[arg(short = 't', long = "decode-streams", action = ArgAction::SetTrue)]
    decode_streams: bool,

    /// Memory budget scale passed to the limits handler
    #[arg(long = "budget")]
    budget: Option<usize>,

    /// Path to file where output is written, or "-" for stdout
    #[arg(short = 'o', long, default_value = "-")]
    outfile: String,
}

#[derive(Serialize)]
struct XrefSummary {
    origin: &'static str,
    size: usize,
    in_use: usize,
    free: usize,
    compressed: usize,
}

#[derive(Serialize)]
struct RevisionSummary {
    xref_offset: usize,
    eof_offset: usize,
    modified: Vec<String>,
}

fn origin_name(origin: XrefOrigin) -> &'static str {
    match origin {
        XrefOrigin::Table => "table",
        XrefOrigin::Stream => "stream",
        XrefOrigin::Rebuilt => "rebuilt",
    }
}

/// Convert a PDF object to JSON. Byte strings are rendered lossily as
/// UTF-8; stream bodies are summarized unless decoding is requested.
fn obj_to_json(doc: &PdfDocument, obj: &PdfObject, decode_streams: bool) -> Value {
    match obj {
        PdfObject::Null => Value::Null,
        PdfObject::Bool(b) => json!(b),
        PdfObject::Int(n) => json!(n),
        PdfObject::Real(f) => json!(f),
        PdfObject::Name(name) => json!(format!("/{name}")),
        PdfObject::String(s) => json!(String::from_utf8_lossy(s)),
        PdfObject::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| obj_to_json(doc, item, decode_streams))
                .collect(),
        ),
        PdfObject::Dict(dict) => Value::Object(
            dict.iter()
                .map(|(k, v)| (k.clone(), obj_to_json(doc, v, decode_streams)))
                .collect(),
        ),
        PdfObject::Stream(stream) => {
            let mut body = json!({
                "attrs": obj_to_json(doc, &PdfObject::Dict(stream.attrs.clone()), decode_streams),
                "raw_length": stream.get_rawdata().len(),
            });
            if decode_streams {
                if let Some(reader) = doc.reader() {
                    match reader.decode_stream(stream) {
                        Ok(data) => {
                            body["decoded_length"] = json!(data.len());
                            body["data"] = json!(String::from_utf8_lossy(&data));
                        }
                        Err(err) => {
                            body["decode_error"] = json!(err.to_string());
                        }
                    }
                }
            }
            json!({ "stream": body })
        }
        PdfObject::Ref(r) => json!({ "ref": r.to_string() }),
    }
}

fn dump_object(doc: &PdfDocument, objid: u32, decode_streams: bool) -> Value {
    let genno = doc.xref().get(objid).map(|slot| slot.genno).unwrap_or(0);
    match doc.get_object(PdfRef::new(objid, genno)) {
        Ok(obj) => json!({
            "id": objid,
            "gen": genno,
            "value": obj_to_json(doc, &obj, decode_streams),
        }),
        Err(err) => json!({ "id": objid, "error": err.to_string() }),
    }
}

fn dump_file(doc: &PdfDocument, args: &Args) -> Value {
    let reader = doc.reader().expect("opened from a file");
    let mut in_use = 0usize;
    let mut free = 0usize;
    let mut compressed = 0usize;
    for (_, slot) in doc.xref().iter() {
        match slot.state {
            SlotState::Free { .. } => free += 1,
            SlotState::Offset(_) => in_use += 1,
            SlotState::InStream { .. } => compressed += 1,
        }
    }
    let summary = XrefSummary {
        origin: origin_name(reader.origin()),
        size: doc.xref().capacity(),
        in_use,
        free,
        compressed,
    };

    let mut out = json!({
        "xref": serde_json::to_value(&summary).expect("summary serializes"),
        "trailer": obj_to_json(doc, &PdfObject::Dict(doc.trailer().clone()), false),
    });

    if args.revisions {
        match doc.revisions() {
            Ok(revisions) => {
                let summaries: Vec<RevisionSummary> = revisions
                    .iter()
                    .map(|rev| RevisionSummary {
                        xref_offset: rev.xref_offset,
                        eof_offset: rev.eof_offset,
                        modified: rev.modified.iter().map(|r| r.to_string()).collect(),
                    })
                    .collect();
                out["revisions"] =
                    serde_json::to_value(&summaries).expect("summaries serialize");
            }
            Err(err) => {
                out["revisions_error"] = json!(err.to_string());
            }
        }
    }

    let objids: Vec<u32> = if args.all {
        doc.xref()
            .iter()
            .filter(|(objid, slot)| *objid != 0 && !slot.is_free())
            .map(|(objid, _)| objid)
            .collect()
    } else if let Some(list) = &args.objects {
        list.split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    } else {
        Vec::new()
    };
    if !objids.is_empty() {
        let objects: Vec<Value> = objids
            .iter()
            .map(|&objid| dump_object(doc, objid, args.decode_streams))
            .collect();
        out["objects"] = Value::Array(objects);
    }

    out
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let limits = Arc::new(match args.budget {
        Some(budget) => MemoryLimitsAwareHandler::with_budget(budget),
        None => MemoryLimitsAwareHandler::default(),
    });

    let mut output: Box<dyn Write> = if args.outfile == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        Box::new(BufWriter::new(File::create(&args.outfile)?))
    };

    for path in &args.files {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        let doc = PdfDocument::open(mmap.to_vec(), Arc::clone(&limits))?;
        let value = dump_file(&doc, &args);
        serde_json::to_writer_pretty(&mut output, &value)?;
        writeln!(output)?;
    }

    output.flush()?;
    Ok(())
}
