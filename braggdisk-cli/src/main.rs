use braggdisk::io::load_stack;
use braggdisk::{
    AnnulusSearch, BraggResult, DistanceBand, Ellipse, EllipseConfig, FilterConfig, LatticeConfig,
    OutlierPolicy, Pipeline, PipelineConfig, PipelineOutput, RadiusBoundConfig, RadiusSearch,
    RegistrationConfig, SpotConfig, SymmetryConfig,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(clap::Parser, Debug)]
#[command(author, version, about = "Bragg disk detection and ellipse fitting (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OutlierPolicyConfig {
    Snap,
    Reject,
}

impl From<OutlierPolicyConfig> for OutlierPolicy {
    fn from(value: OutlierPolicyConfig) -> Self {
        match value {
            OutlierPolicyConfig::Snap => OutlierPolicy::Snap,
            OutlierPolicyConfig::Reject => OutlierPolicy::Reject,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
enum DistanceBandConfig {
    Span,
    Nearest { upto: usize },
    Extremes,
}

impl From<DistanceBandConfig> for DistanceBand {
    fn from(value: DistanceBandConfig) -> Self {
        match value {
            DistanceBandConfig::Span => DistanceBand::Span,
            DistanceBandConfig::Nearest { upto } => DistanceBand::Nearest { upto },
            DistanceBandConfig::Extremes => DistanceBand::Extremes,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RegistrationJson {
    thickness: f64,
    blur_sigma: f64,
    annulus_power: u32,
    correlation_sigma: f64,
    window: bool,
    peak_tolerance: f32,
    min_confidence: f32,
    pair_window: Option<usize>,
    subpixel: bool,
    reference: usize,
}

impl Default for RegistrationJson {
    fn default() -> Self {
        let cfg = RegistrationConfig::default();
        Self {
            thickness: cfg.filter.thickness,
            blur_sigma: cfg.filter.blur_sigma,
            annulus_power: cfg.filter.annulus_power,
            correlation_sigma: cfg.filter.correlation_sigma,
            window: cfg.window,
            peak_tolerance: cfg.peak_tolerance,
            min_confidence: cfg.min_confidence,
            pair_window: cfg.pair_window,
            subpixel: cfg.subpixel,
            reference: cfg.reference,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SpotsJson {
    thickness: f64,
    blur_sigma: f64,
    proportion: f64,
    bins: usize,
    ignore_zeros: bool,
    lattice: bool,
    cluster_tolerance: f64,
    min_population: usize,
    snap_radius: usize,
    max_iterations: usize,
    reinfer: bool,
    tolerance: f64,
    outlier_policy: OutlierPolicyConfig,
}

impl Default for SpotsJson {
    fn default() -> Self {
        let cfg = SpotConfig::default();
        Self {
            thickness: cfg.thickness,
            blur_sigma: cfg.blur_sigma,
            proportion: cfg.proportion,
            bins: cfg.bins,
            ignore_zeros: cfg.ignore_zeros,
            lattice: cfg.lattice.enabled,
            cluster_tolerance: cfg.lattice.cluster_tolerance,
            min_population: cfg.lattice.min_population,
            snap_radius: cfg.lattice.snap_radius,
            max_iterations: cfg.lattice.max_iterations,
            reinfer: cfg.lattice.reinfer,
            tolerance: cfg.lattice.tolerance,
            outlier_policy: OutlierPolicyConfig::Snap,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct EllipseJson {
    inner_radius: Option<f64>,
    outer_radius: Option<f64>,
    min_points: usize,
    max_iterations: usize,
    convergence_threshold: f64,
    distance_accuracy: f64,
    distance_clusters: usize,
    band: DistanceBandConfig,
}

impl Default for EllipseJson {
    fn default() -> Self {
        let cfg = EllipseConfig::default();
        Self {
            inner_radius: cfg.inner_radius,
            outer_radius: cfg.outer_radius,
            min_points: cfg.min_points,
            max_iterations: cfg.max_iterations,
            convergence_threshold: cfg.convergence_threshold,
            distance_accuracy: cfg.distance_accuracy,
            distance_clusters: cfg.distance_clusters,
            band: DistanceBandConfig::Span,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AnnulusJson {
    range: usize,
    max_thickness: usize,
}

impl Default for AnnulusJson {
    fn default() -> Self {
        let search = AnnulusSearch::default();
        Self {
            range: search.range,
            max_thickness: search.max_thickness,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SymmetryJson {
    enabled: bool,
    target_size: usize,
    angle_steps: usize,
    top: usize,
    min_separation_deg: f64,
    periodic_folds: Vec<usize>,
}

impl Default for SymmetryJson {
    fn default() -> Self {
        let cfg = SymmetryConfig::default();
        Self {
            enabled: false,
            target_size: cfg.target_size,
            angle_steps: cfg.angle_steps,
            top: cfg.top,
            min_separation_deg: cfg.min_separation.to_degrees(),
            periodic_folds: cfg.periodic_folds,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    image_paths: Vec<String>,
    output_path: Option<String>,
    spot_radius: f64,
    radius_search: Option<[usize; 2]>,
    radius_bound: bool,
    annulus: Option<AnnulusJson>,
    parallel: bool,
    spot_map_radius: Option<usize>,
    registration: RegistrationJson,
    spots: SpotsJson,
    ellipse: EllipseJson,
    symmetry: SymmetryJson,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_paths: Vec::new(),
            output_path: None,
            spot_radius: PipelineConfig::default().spot_radius,
            radius_search: None,
            radius_bound: false,
            annulus: None,
            parallel: false,
            spot_map_radius: None,
            registration: RegistrationJson::default(),
            spots: SpotsJson::default(),
            ellipse: EllipseJson::default(),
            symmetry: SymmetryJson::default(),
        }
    }
}

impl Config {
    fn into_pipeline(self) -> PipelineConfig {
        let r = self.registration;
        let s = self.spots;
        let e = self.ellipse;
        let symmetry = self.symmetry.enabled.then(|| SymmetryConfig {
            target_size: self.symmetry.target_size,
            angle_steps: self.symmetry.angle_steps,
            top: self.symmetry.top,
            min_separation: self.symmetry.min_separation_deg.to_radians(),
            periodic_folds: self.symmetry.periodic_folds.clone(),
            ..SymmetryConfig::default()
        });
        PipelineConfig {
            spot_radius: self.spot_radius,
            radius_search: self.radius_search.map(|[min, max]| RadiusSearch { min, max }),
            radius_bound: self.radius_bound.then(|| RadiusBoundConfig {
                min_radius: self.radius_search.map_or(1, |[min, _]| min),
                ..RadiusBoundConfig::default()
            }),
            annulus: self.annulus.map(|a| AnnulusSearch {
                range: a.range,
                max_thickness: a.max_thickness,
            }),
            registration: RegistrationConfig {
                filter: FilterConfig {
                    radius: self.spot_radius,
                    thickness: r.thickness,
                    blur_sigma: r.blur_sigma,
                    annulus_power: r.annulus_power,
                    correlation_sigma: r.correlation_sigma,
                },
                window: r.window,
                peak_tolerance: r.peak_tolerance,
                min_confidence: r.min_confidence,
                pair_window: r.pair_window,
                subpixel: r.subpixel,
                reference: r.reference,
                parallel: false,
            },
            spots: SpotConfig {
                radius: self.spot_radius,
                thickness: s.thickness,
                blur_sigma: s.blur_sigma,
                proportion: s.proportion,
                bins: s.bins,
                ignore_zeros: s.ignore_zeros,
                lattice: LatticeConfig {
                    enabled: s.lattice,
                    cluster_tolerance: s.cluster_tolerance,
                    min_population: s.min_population,
                    snap_radius: s.snap_radius,
                    max_iterations: s.max_iterations,
                    reinfer: s.reinfer,
                    tolerance: s.tolerance,
                    policy: s.outlier_policy.into(),
                },
                parallel: false,
            },
            ellipse: EllipseConfig {
                inner_radius: e.inner_radius,
                outer_radius: e.outer_radius,
                min_points: e.min_points,
                max_iterations: e.max_iterations,
                convergence_threshold: e.convergence_threshold,
                distance_accuracy: e.distance_accuracy,
                distance_clusters: e.distance_clusters,
                band: e.band.into(),
                parallel: false,
            },
            symmetry,
            spot_map_radius: self.spot_map_radius,
        }
        .parallel(self.parallel)
    }
}

#[derive(Debug, Serialize)]
struct EllipseRecord {
    is_ellipse: bool,
    center: Option<[f64; 2]>,
    a: Option<f64>,
    b: Option<f64>,
    angle: Option<f64>,
    extrema: Option<[[f64; 2]; 4]>,
    error: Option<String>,
}

impl From<&BraggResult<Ellipse>> for EllipseRecord {
    fn from(value: &BraggResult<Ellipse>) -> Self {
        match value {
            Ok(e) if e.is_ellipse => Self {
                is_ellipse: true,
                center: Some(e.center),
                a: Some(e.a),
                b: Some(e.b),
                angle: Some(e.angle),
                extrema: Some(e.extrema),
                error: None,
            },
            Ok(_) => Self {
                is_ellipse: false,
                center: None,
                a: None,
                b: None,
                angle: None,
                extrema: None,
                error: None,
            },
            Err(err) => Self {
                is_ellipse: false,
                center: None,
                a: None,
                b: None,
                angle: None,
                extrema: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageRecord {
    index: usize,
    offset: Option<[f64; 2]>,
    ellipses: Vec<EllipseRecord>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpotRecord {
    x: usize,
    y: usize,
    score: f32,
    accumulator_ellipse: EllipseRecord,
}

#[derive(Debug, Serialize)]
struct Output {
    spot_radius: f64,
    annulus_thickness: Option<f64>,
    accumulator_size: [usize; 2],
    accumulator_origin: [i64; 2],
    lattice_vectors: Vec<[f64; 2]>,
    spots: Vec<SpotRecord>,
    images: Vec<ImageRecord>,
    symmetry_intersection: Option<[f64; 2]>,
    symmetry_origin: Option<[f64; 2]>,
}

impl From<&PipelineOutput> for Output {
    fn from(out: &PipelineOutput) -> Self {
        let positions = &out.registration.positions;
        let spots = out
            .detection
            .spots
            .iter()
            .zip(&out.accumulator_ellipses)
            .map(|(s, e)| SpotRecord {
                x: s.x,
                y: s.y,
                score: s.score,
                accumulator_ellipse: e.into(),
            })
            .collect();
        let images = out
            .image_ellipses
            .iter()
            .map(|img| {
                let offset = positions.get(img.image).ok().map(|o| [o.dx, o.dy]);
                match &img.spots {
                    Ok(fits) => ImageRecord {
                        index: img.image,
                        offset,
                        ellipses: fits.iter().map(EllipseRecord::from).collect(),
                        error: None,
                    },
                    Err(err) => ImageRecord {
                        index: img.image,
                        offset,
                        ellipses: Vec::new(),
                        error: Some(err.to_string()),
                    },
                }
            })
            .collect();
        let (ox, oy) = out.accumulator.origin();
        Self {
            spot_radius: out.spot_radius,
            annulus_thickness: out.annulus_thickness,
            accumulator_size: [out.accumulator.width(), out.accumulator.height()],
            accumulator_origin: [ox, oy],
            lattice_vectors: out
                .detection
                .lattice
                .as_ref()
                .map(|l| l.basis.clone())
                .unwrap_or_default(),
            spots,
            images,
            symmetry_intersection: out.symmetry.as_ref().and_then(|s| s.intersection),
            symmetry_origin: out.symmetry.as_ref().and_then(|s| s.origin),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = <Cli as clap::Parser>::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("braggdisk=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.image_paths.is_empty() {
        return Err("image_paths must list at least one image".into());
    }
    if !config.spot_radius.is_finite() || config.spot_radius <= 0.0 {
        return Err("spot_radius must be positive".into());
    }

    let images = load_stack(&config.image_paths)?;
    let output_path = config.output_path.clone();
    let pipeline = Pipeline::new(config.into_pipeline());
    let result = pipeline.run(&images)?;
    tracing::info!(
        spots = result.detection.spots.len(),
        rejected_pairs = result.registration.rejected.len(),
        "pipeline finished"
    );

    let json = serde_json::to_string_pretty(&Output::from(&result))?;
    match output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
