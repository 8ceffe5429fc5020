use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dicom_rtstruct_seg::{
    DefaultSegmentMetadata, ExportOptions, ExportableRoi, RoiSession, SegmentDescriptor,
    SeriesLoader, SeriesMetadata, SortBy,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Convert DICOM RT Structure Sets into DICOM Segmentation objects
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the ROIs of a structure set that have contours on the series
    List {
        #[command(flatten)]
        input: Input,
    },
    /// Export ROIs of a structure set as a Segmentation
    Convert {
        #[command(flatten)]
        input: Input,
        /// Output Segmentation file
        #[arg(short, long, default_value = "seg.dcm")]
        output: PathBuf,
        /// ROI to export, by UID or name; all ROIs when omitted
        #[arg(long = "roi")]
        rois: Vec<String>,
        /// JSON object mapping ROI UID or name to segment metadata
        #[arg(long)]
        segments: Option<PathBuf>,
        /// JSON file with export options
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args)]
struct Input {
    /// RT Structure Set file
    rtstruct: PathBuf,
    /// Directory holding the .dcm images of the referenced series
    series: PathBuf,
    /// Sort slices by instance number instead of position
    #[arg(long)]
    by_instance_number: bool,
    /// Label the structure set is registered under
    #[arg(long, default_value = "RTSTRUCT")]
    label: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match App::parse().command {
        Command::List { input } => {
            let (session, series_uid) = open_session(&input, ExportOptions::default()).await?;
            for roi in session.list_exportable_rois(&series_uid) {
                println!("{}\t{}\t{} polygons", roi.id, roi.name, roi.polygon_count);
            }
        }
        Command::Convert {
            input,
            output,
            rois,
            segments,
            config,
        } => {
            let (segments, config) = tokio::try_join!(
                read_json::<HashMap<String, SegmentDescriptor>>(segments),
                read_json::<ExportOptions>(config),
            )?;
            let options = config.unwrap_or_default();
            let (session, series_uid) = open_session(&input, options).await?;

            let exportable = session.list_exportable_rois(&series_uid);
            let selected = select(&exportable, &rois)?;
            if selected.is_empty() {
                bail!("structure set has no ROI with contours on series {series_uid}");
            }
            let names: HashMap<_, _> = exportable
                .iter()
                .map(|roi| (roi.id.clone(), roi.name.clone()))
                .collect();

            let ids: Vec<_> = selected.iter().map(|roi| roi.id.as_str()).collect();
            let report = match segments {
                Some(by_key) => {
                    let descriptors = resolve_descriptors(&exportable, by_key);
                    session.export_with_diagnostics(&series_uid, &ids, &descriptors)?
                }
                None => session.export_with_diagnostics(&series_uid, &ids, &DefaultSegmentMetadata::new(&names))?,
            };
            for diagnostic in &report.diagnostics {
                warn!("{diagnostic}");
            }
            tokio::fs::write(&output, report.buffer)
                .await
                .with_context(|| format!("could not write {}", output.display()))?;
            info!(output = %output.display(), segments = ids.len(), "wrote segmentation");
        }
    }
    Ok(())
}

/// Load the series geometry and import the structure set into a new session.
async fn open_session(
    input: &Input,
    options: ExportOptions,
) -> anyhow::Result<(RoiSession<HashMap<String, SeriesMetadata>>, String)> {
    let sort_by = if input.by_instance_number {
        SortBy::InstanceNumber
    } else {
        SortBy::ImagePositionPatient
    };
    let directory = input.series.clone();
    let (buffer, series) = tokio::try_join!(
        async {
            tokio::fs::read(&input.rtstruct)
                .await
                .with_context(|| format!("could not read {}", input.rtstruct.display()))
        },
        async {
            tokio::task::spawn_blocking(move || SeriesLoader::load_from_directory(directory, sort_by))
                .await?
                .context("could not load the series")
        },
    )?;

    let series_uid = series.series_instance_uid.clone();
    let session = RoiSession::new(HashMap::from([(series_uid.clone(), series)]), options);
    let report = session.decode(&buffer, &series_uid, &input.label, &input.label)?;
    info!(
        polygons = report.polygons.len(),
        skipped = report.diagnostics.len(),
        "decoded structure set"
    );
    Ok((session, series_uid))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: Option<PathBuf>) -> anyhow::Result<Option<T>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;
    let value = serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))?;
    Ok(Some(value))
}

fn select<'r>(exportable: &'r [ExportableRoi], requested: &[String]) -> anyhow::Result<Vec<&'r ExportableRoi>> {
    if requested.is_empty() {
        return Ok(exportable.iter().collect());
    }
    requested
        .iter()
        .map(|key| {
            exportable
                .iter()
                .find(|roi| &roi.id == key || &roi.name == key)
                .with_context(|| format!("no ROI with contours matches {key}"))
        })
        .collect()
}

/// Key segment metadata by ROI UID, accepting ROI names as keys too.
fn resolve_descriptors(
    exportable: &[ExportableRoi],
    by_key: HashMap<String, SegmentDescriptor>,
) -> HashMap<String, SegmentDescriptor> {
    let mut descriptors = HashMap::new();
    for (key, descriptor) in by_key {
        match exportable.iter().find(|roi| roi.id == key || roi.name == key) {
            Some(roi) => {
                descriptors.insert(roi.id.clone(), descriptor);
            }
            None => warn!(key = %key, "segment metadata does not match any ROI"),
        }
    }
    descriptors
}
