use clap::Parser;
use kicad_doc::error::{line_col, DocError};
use kicad_doc::geometry::BBox;
use kicad_doc::hierarchy::{DirectorySource, HierarchyResolver, SheetTree};
use kicad_doc::types::DocumentKind;
use kicad_doc::{load_bytes, load_path, Loaded};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kicad-doc", about = "Parse KiCad schematics and boards to JSON")]
struct Cli {
    /// Input file (.kicad_sch or .kicad_pcb)
    input: PathBuf,

    /// Output JSON file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the extension check (sch, pcb)
    #[arg(short, long)]
    format: Option<String>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Resolve sub-sheets from the input's directory and emit the sheet tree
    #[arg(long)]
    hierarchy: bool,

    /// Print the generic S-expression tree instead of JSON
    #[arg(long)]
    dump: bool,
}

#[derive(Serialize)]
struct Output<'a> {
    #[serde(flatten)]
    loaded: &'a Loaded,
    #[serde(skip_serializing_if = "Option::is_none")]
    extent: Option<BBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hierarchy: Option<SheetTree>,
}

fn parse_format(s: &str) -> Result<DocumentKind, String> {
    match s.to_lowercase().as_str() {
        "sch" | "schematic" | "kicad_sch" => Ok(DocumentKind::Schematic),
        "pcb" | "board" | "kicad_pcb" => Ok(DocumentKind::Board),
        _ => Err(format!("Unknown format: {s}. Use: sch, pcb")),
    }
}

fn fail(input: &Path, text: Option<&str>, err: &DocError) -> ! {
    match (text, err.offset()) {
        (Some(text), Some(offset)) => {
            let (line, col) = line_col(text, offset);
            eprintln!("{}:{line}:{col}: {err}", input.display());
        }
        _ => eprintln!("Error: {err}"),
    }
    std::process::exit(1);
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let data = match std::fs::read(&cli.input) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading file: {e}");
            std::process::exit(1);
        }
    };
    let text = String::from_utf8_lossy(&data);

    if cli.dump {
        match kicad_doc::sexpr::parse(&text) {
            Ok(tree) => println!("{tree}"),
            Err(e) => fail(&cli.input, Some(&*text), &e.into()),
        }
        return;
    }

    let result = if let Some(fmt_str) = &cli.format {
        let want = match parse_format(fmt_str) {
            Ok(k) => k,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        };
        load_bytes(&data).inspect(|l| {
            if l.document.kind() != want {
                log::warn!("expected {want:?}, found {:?}", l.document.kind());
            }
        })
    } else {
        load_path(&cli.input)
    };
    let loaded = match result {
        Ok(l) => Arc::new(l),
        Err(e) => fail(&cli.input, Some(&*text), &e),
    };
    for diag in &loaded.diagnostics {
        log::warn!("{diag}");
    }

    let hierarchy = (cli.hierarchy && loaded.document.kind() == DocumentKind::Schematic).then(|| {
        let root_file = cli
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source = DirectorySource::beside(&cli.input);
        HierarchyResolver::new(Arc::clone(&loaded), root_file, source).tree()
    });

    let output = Output {
        loaded: &loaded,
        extent: loaded.document.extent(),
        hierarchy,
    };
    let json = if cli.pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    };
    let json = match json {
        Ok(j) => j,
        Err(e) => {
            eprintln!("JSON serialization failed: {e}");
            std::process::exit(1);
        }
    };

    if let Some(output_path) = cli.output {
        if let Err(e) = std::fs::write(&output_path, &json) {
            eprintln!("Failed to write output file: {e}");
            std::process::exit(1);
        }
        eprintln!("Written to {}", output_path.display());
    } else {
        println!("{json}");
    }
}
