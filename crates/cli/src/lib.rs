use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use quire_compose::{suggested_filename, OutputKind, Session};
use quire_engine::{default_engine, RenderEngine};
use quire_model::{CompressionPreset, PageRefId};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "quire")]
#[command(about = "Merge, split, and compress PDFs without leaving your machine")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Merge input PDFs into one document, pages in argument order.
    Merge {
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,
        /// Output path (default: merged.pdf).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Extract a subset of pages into a new document.
    Split {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// 1-based pages to keep, e.g. "2,4" or "1-3,7".
        #[arg(long)]
        pages: String,
        /// Output path (default: split-<file>).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Re-render every page as a JPEG to shrink the file. Lossy: text,
    /// fonts, and vector content are flattened to images.
    Compress {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = PresetArg::Standard)]
        preset: PresetArg,
        /// Override the preset's JPEG quality, fraction in (0, 1].
        #[arg(long)]
        quality: Option<f32>,
        /// Override the preset's render scale multiplier.
        #[arg(long)]
        scale: Option<f32>,
        /// Output path (default: compressed-<file>).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    Standard,
    HighFidelity,
}

impl PresetArg {
    fn preset(self) -> CompressionPreset {
        match self {
            PresetArg::Standard => CompressionPreset::Standard,
            PresetArg::HighFidelity => CompressionPreset::HighFidelity,
        }
    }
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: PageSizeOutput,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Merge { files, output } => run_merge(&files, output.as_deref()),
        Commands::Split { file, pages, output } => run_split(&file, &pages, output.as_deref()),
        Commands::Compress { file, preset, quality, scale, output } => {
            run_compress(&file, preset, quality, scale, output.as_deref())
        }
        Commands::Info { file } => run_info(&file),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_merge(files: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let mut batch = Vec::with_capacity(files.len());
    for file in files {
        match fs::read(file) {
            Ok(bytes) => batch.push((display_name(file), bytes)),
            Err(err) => log::warn!("skipping {}: {err}", file.display()),
        }
    }

    let mut session = Session::new();
    for outcome in session.load_files(batch) {
        if let Err(err) = outcome.result {
            log::warn!("skipping {}: {err}", outcome.name);
        }
    }

    if session.working_set().is_empty() {
        bail!("none of the inputs could be loaded");
    }

    let bytes = session.build_copy().context("merge failed")?;
    write_output(&bytes, output, || suggested_filename(OutputKind::Merge, None))
}

fn run_split(file: &Path, pages: &str, output: Option<&Path>) -> Result<()> {
    ensure_pdf_exists(file)?;

    let keep = parse_page_list(pages)?;

    let name = display_name(file);
    let mut session = Session::new();
    let outcomes = session.load_files(vec![(name.clone(), fs::read(file)?)]);
    if let Some(Err(err)) = outcomes.into_iter().next().map(|outcome| outcome.result) {
        return Err(err).with_context(|| format!("failed to load {}", file.display()));
    }

    let page_count = session.working_set().len() as u32;
    if let Some(&out_of_range) = keep.iter().find(|&&page| page > page_count) {
        bail!("page {out_of_range} does not exist (document has {page_count} pages)");
    }

    let doomed: HashSet<PageRefId> = session
        .working_set()
        .iter()
        .filter(|page_ref| !keep.contains(&page_ref.original_page_index))
        .map(|page_ref| page_ref.id)
        .collect();
    session.working_set_mut().remove_many(&doomed);

    let bytes = session.build_copy().context("split failed")?;
    write_output(&bytes, output, || suggested_filename(OutputKind::Split, Some(&name)))
}

fn run_compress(
    file: &Path,
    preset: PresetArg,
    quality: Option<f32>,
    scale: Option<f32>,
    output: Option<&Path>,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut profile = preset.preset().profile();
    if let Some(quality) = quality {
        profile.quality = quality;
    }
    if let Some(scale) = scale {
        profile.scale = scale;
    }
    let profile = profile.clamped();

    let name = display_name(file);
    let mut session = Session::new();
    let outcomes = session.load_files(vec![(name.clone(), fs::read(file)?)]);
    if let Some(Err(err)) = outcomes.into_iter().next().map(|outcome| outcome.result) {
        return Err(err).with_context(|| format!("failed to load {}", file.display()));
    }

    let mut engine = make_engine()?;
    let mut progress = |done: usize, total: usize| eprintln!("page {done} of {total}");

    let bytes = session
        .build_rasterize(&profile, engine.as_mut(), &mut progress)
        .context("compress failed")?;
    write_output(&bytes, output, || suggested_filename(OutputKind::Compress, Some(&name)))
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(&fs::read(file)?).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let size = engine.page_size(handle, 0)?;

    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count,
        first_page_size_pt: PageSizeOutput { width: size.width_pt, height: size.height_pt },
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

#[cfg(feature = "pdfium")]
fn make_engine() -> Result<Box<dyn RenderEngine>> {
    let engine = quire_engine::pdfium_backend::PdfiumEngine::from_system_library()
        .context("failed to initialize pdfium")?;
    Ok(Box::new(engine))
}

#[cfg(not(feature = "pdfium"))]
fn make_engine() -> Result<Box<dyn RenderEngine>> {
    Ok(Box::new(default_engine()))
}

/// Parse a 1-based page list like "2,4" or "1-3,7".
fn parse_page_list(input: &str) -> Result<BTreeSet<u32>> {
    let mut pages = BTreeSet::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            bail!("empty entry in page list {input:?}");
        }

        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .with_context(|| format!("invalid page range {part:?}"))?;
            let end: u32 = end
                .trim()
                .parse()
                .with_context(|| format!("invalid page range {part:?}"))?;
            if start == 0 || end < start {
                bail!("invalid page range {part:?} (pages are 1-based, ranges ascending)");
            }
            pages.extend(start..=end);
        } else {
            let page: u32 =
                part.parse().with_context(|| format!("invalid page number {part:?}"))?;
            if page == 0 {
                bail!("page numbers are 1-based");
            }
            pages.insert(page);
        }
    }

    Ok(pages)
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("output.pdf")
        .to_owned()
}

fn write_output(bytes: &[u8], output: Option<&Path>, default_name: impl FnOnce() -> String) -> Result<()> {
    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| PathBuf::from(default_name()));

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(&output, bytes)
        .with_context(|| format!("failed to write output to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singles_and_ranges() {
        let pages = parse_page_list("1-3,7").expect("parse should succeed");
        assert_eq!(pages.into_iter().collect::<Vec<_>>(), vec![1, 2, 3, 7]);
    }

    #[test]
    fn duplicate_entries_collapse() {
        let pages = parse_page_list("2,2,1-2").expect("parse should succeed");
        assert_eq!(pages.into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn zero_pages_are_rejected() {
        assert!(parse_page_list("0").is_err());
        assert!(parse_page_list("0-2").is_err());
    }

    #[test]
    fn descending_ranges_are_rejected() {
        assert!(parse_page_list("5-2").is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_page_list("a,b").is_err());
        assert!(parse_page_list("").is_err());
        assert!(parse_page_list("1,,2").is_err());
    }
}
