use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use kicad_doc::geometry::{BBox, Point};
use kicad_doc::hierarchy::{HierarchyResolver, SheetTree};
use kicad_doc::types::DocumentKind;
use kicad_doc::Loaded;
use kiview::{LoadOutcome, NullRenderer, SelectionChanged, Viewer, ViewerOptions};
use kiview_fetch::{collect_sheets, FetchConfig, Session, Vfs};
use serde::Serialize;

/// Fetch a KiCad project and report what the viewer sees.
#[derive(Parser)]
#[command(name = "kiview-fetch", version)]
struct Cli {
    /// Directory, zip archive, or GitLab / GitHub link
    source: String,

    /// Document to open (defaults to the first schematic, then board)
    file: Option<String>,

    /// Select the entity under world coordinates X,Y
    #[arg(long, value_name = "X,Y", value_parser = parse_point)]
    pick: Option<Point>,

    /// Pick twice, which shows details and descends into sheets
    #[arg(long, requires = "pick")]
    open: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s.split_once(',').ok_or("expected X,Y")?;
    let x = x.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let y = y.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok(Point::new(x, y))
}

#[derive(Serialize)]
struct Report<'a> {
    files: Vec<String>,
    file: &'a str,
    #[serde(flatten)]
    loaded: &'a Loaded,
    #[serde(skip_serializing_if = "Option::is_none")]
    extent: Option<BBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hierarchy: Option<SheetTree>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    picked: Vec<SelectionChanged>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate_limit_remaining: Option<u64>,
}

const VIEW_WIDTH: f64 = 1280.0;
const VIEW_HEIGHT: f64 = 800.0;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = FetchConfig::from_env();
    let vfs = Arc::new(Vfs::open(&cli.source, &config).await?);
    let files = vfs.list();
    let file = match cli.file.or_else(|| vfs.default_document()) {
        Some(f) => f,
        None => return Err(format!("no KiCad documents in {}", cli.source).into()),
    };

    let mut viewer = Viewer::new(ViewerOptions::default(), NullRenderer);
    viewer.resize(VIEW_WIDTH, VIEW_HEIGHT);

    let (mut session, mut rx) = Session::new(Arc::clone(&vfs));
    let generation = session.load(file.clone(), viewer.begin_load());
    let msg = loop {
        let msg = rx.recv().await.ok_or("load task ended without a result")?;
        if msg.generation == generation {
            break msg;
        }
    };
    let loaded = msg.result?;

    let sheets = if loaded.document.kind() == DocumentKind::Schematic {
        Some(collect_sheets(&vfs, &loaded).await)
    } else {
        None
    };
    let hierarchy = sheets.clone().map(|source| {
        HierarchyResolver::new(Arc::new(loaded.clone()), file.clone(), source).tree()
    });

    if viewer.finish_load(msg.ticket, file.clone(), Ok::<_, kiview_fetch::FetchError>(loaded))
        != LoadOutcome::Applied
    {
        return Err(format!("{file}: load was not applied").into());
    }
    if let Some(source) = sheets {
        viewer.attach_sheets(source)?;
    }

    let mut picked = Vec::new();
    if let (Some(world), Some(transform)) = (cli.pick, viewer.transform()) {
        let screen = transform.world_to_screen(world);
        let clicks = if cli.open { 2 } else { 1 };
        for _ in 0..clicks {
            if let Some(change) = viewer.pointer_down(screen.x, screen.y) {
                picked.push(change);
            }
        }
    }

    let Some(current) = viewer.loaded().cloned() else {
        return Err("viewer has no document".into());
    };
    let report = Report {
        files,
        file: viewer.file().unwrap_or(&file),
        loaded: &current,
        extent: current.document.extent(),
        hierarchy,
        picked,
        rate_limit_remaining: match vfs.as_ref() {
            Vfs::GitLab(fs) | Vfs::GitHub(fs) => fs.rate_limit_remaining(),
            _ => None,
        },
    };
    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}
