//! Command-line surface: arguments, shell strings, progress and reporting.

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::Parser;
use indicatif::ProgressBar;

use crate::config::ShellConfig;
use crate::datatypes::{Resolution, Resolutions};
use crate::domains::DomainRegistry;
use crate::error::{Result, ShellmeshError};
use crate::mesher::{GrowthLaw, LayerObserver, ShellLayer, ShellOptions, ShellSummary};

pub const DEFAULT_MARGIN: f64 = 1.0;

/// Surround a sample mesh with structured hexahedral shell layers
#[derive(Parser, Debug)]
#[command(name = "shellmesh", version, long_about = None)]
pub struct Args {
    /// Shell layers and resolutions, LAYERSxRXxRYxRZ[xRXxRYxRZ...]
    #[arg(short, long)]
    pub shell: Option<String>,

    /// Gap between the sample's bounding box and the first shell layer
    #[arg(short = 'm', long = "shell-margin")]
    pub margin: Option<f64>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Scale layer i by RATIO^i
    #[arg(long, value_name = "RATIO", conflicts_with = "growth_step")]
    pub growth_ratio: Option<f64>,

    /// Scale layer i by 1 + STEP * i
    #[arg(long, value_name = "STEP")]
    pub growth_step: Option<f64>,

    /// Distance below which seam vertices are merged
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Add a facet domain covering the outermost shell boundary
    #[arg(long)]
    pub mark_boundary: bool,

    /// Multiply all coordinates of the written mesh by this factor
    #[arg(long)]
    pub scale: Option<f64>,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Sample mesh (.msh or .xml)
    pub source: PathBuf,

    /// Output mesh (.msh or .xml)
    pub target: PathBuf,
}

/// Parsed form of a shell string such as `2x4x4x4x8x8x8`
#[derive(Debug, Clone, PartialEq)]
pub struct ShellRequest {
    pub layer_count: usize,
    pub resolutions: Resolutions,
}

/// Parses `LAYERSxRXxRYxRZ[...]`.
///
/// The first token is the layer count, the rest are grouped in triples. A
/// single triple applies to every layer.
pub fn parse_shell_spec(spec: &str) -> Result<ShellRequest> {
    let invalid = |details: String| {
        ShellmeshError::invalid_parameter(format!("shell '{spec}': {details}"))
    };

    let numbers = spec
        .split(|c: char| c == 'x' || c == 'X')
        .map(|token| {
            token
                .trim()
                .parse::<usize>()
                .map_err(|_| invalid(format!("'{token}' is not a non-negative integer")))
        })
        .collect::<Result<Vec<usize>>>()?;

    let (&layer_count, rest) = numbers
        .split_first()
        .ok_or_else(|| invalid("nothing to parse".to_owned()))?;
    if layer_count == 0 {
        return Err(invalid("at least one layer is required".to_owned()));
    }
    if rest.is_empty() || rest.len() % 3 != 0 {
        return Err(invalid(format!(
            "expected resolutions in groups of three, found {} value(s)",
            rest.len()
        )));
    }

    let mut resolutions = rest
        .chunks(3)
        .map(|c| Resolution::new(c[0], c[1], c[2]))
        .collect::<Result<Vec<Resolution>>>()?;
    let resolutions = if resolutions.len() == 1 {
        Resolutions::Uniform(resolutions.remove(0))
    } else {
        Resolutions::PerLayer(resolutions)
    };

    Ok(ShellRequest {
        layer_count,
        resolutions,
    })
}

/// Effective run settings after merging flags over the configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub shell: Option<ShellRequest>,
    pub margin: f64,
    pub options: ShellOptions,
    pub scale: f64,
}

impl Args {
    pub fn resolve(&self, config: ShellConfig) -> Result<Settings> {
        let shell = match &self.shell {
            Some(spec) => Some(parse_shell_spec(spec)?),
            None => config.shell,
        };

        let growth = match (self.growth_ratio, self.growth_step) {
            (Some(ratio), _) => GrowthLaw::Geometric { ratio },
            (None, Some(step)) => GrowthLaw::Linear { step },
            (None, None) => config.growth.unwrap_or_default(),
        };

        let defaults = ShellOptions::default();
        Ok(Settings {
            shell,
            margin: self.margin.or(config.margin).unwrap_or(DEFAULT_MARGIN),
            options: ShellOptions {
                growth,
                tolerance: self
                    .tolerance
                    .or(config.tolerance)
                    .unwrap_or(defaults.tolerance),
                mark_outer_boundary: self.mark_boundary
                    || config
                        .mark_outer_boundary
                        .unwrap_or(defaults.mark_outer_boundary),
            },
            scale: self.scale.or(config.scale).unwrap_or(1.0),
        })
    }
}

/// Advances a progress bar as shell layers complete
pub struct LayerProgressBar {
    bar: Option<ProgressBar>,
}

impl LayerProgressBar {
    pub fn new() -> LayerProgressBar {
        LayerProgressBar { bar: None }
    }
}

impl Default for LayerProgressBar {
    fn default() -> Self {
        LayerProgressBar::new()
    }
}

impl LayerObserver for LayerProgressBar {
    fn observe_init(&mut self, layer_count: usize) {
        self.bar = Some(ProgressBar::new(layer_count as u64));
    }

    fn observe_layer(&mut self, layer: &ShellLayer) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("layer {} ({} cells)", layer.index, layer.cells));
            bar.inc(1);
        }
    }

    fn observe_final(&mut self, _summary: &ShellSummary) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

/// Renders the domain table printed after a run.
pub fn domain_report(domains: &DomainRegistry) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "{:<6} {:>6}  name", "type", "id");
    for domain in domains.domains() {
        let _ = writeln!(
            report,
            "{:<6} {:>6}  {}",
            domain.key.dim.to_string(),
            domain.key.id,
            domain.name
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Dim;

    fn res(n: usize) -> Resolution {
        Resolution::new(n, n, n).unwrap()
    }

    #[test]
    fn per_layer_shell_string() {
        let request = parse_shell_spec("2x4x4x4x8x8x8").unwrap();
        assert_eq!(request.layer_count, 2);
        assert_eq!(request.resolutions, Resolutions::PerLayer(vec![res(4), res(8)]));
    }

    #[test]
    fn single_triple_is_uniform() {
        let request = parse_shell_spec("3x10x10x2").unwrap();
        assert_eq!(request.layer_count, 3);
        assert_eq!(
            request.resolutions,
            Resolutions::Uniform(Resolution::new(10, 10, 2).unwrap())
        );
    }

    #[test]
    fn malformed_shell_strings_fail() {
        for spec in ["", "2", "0x4x4x4", "2x4x4", "2x4x0x4", "2xfourx4x4", "2x4x4x4x8"] {
            assert!(
                matches!(parse_shell_spec(spec), Err(ShellmeshError::InvalidParameter(_))),
                "{spec}"
            );
        }
    }

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "shellmesh",
            "-s",
            "1x4x4x4",
            "--growth-step",
            "0.5",
            "sample.msh",
            "out.xml",
        ])
        .unwrap();
        let config = ShellConfig {
            shell: Some(parse_shell_spec("2x3x3x3").unwrap()),
            margin: Some(0.25),
            growth: Some(GrowthLaw::Geometric { ratio: 3.0 }),
            mark_outer_boundary: Some(true),
            ..ShellConfig::default()
        };
        let settings = args.resolve(config).unwrap();
        assert_eq!(settings.shell.unwrap().layer_count, 1);
        assert_eq!(settings.margin, 0.25);
        assert_eq!(settings.options.growth, GrowthLaw::Linear { step: 0.5 });
        assert!(settings.options.mark_outer_boundary);
        assert_eq!(settings.scale, 1.0);
    }

    #[test]
    fn defaults_without_config() {
        let args = Args::try_parse_from(["shellmesh", "in.msh", "out.msh"]).unwrap();
        let settings = args.resolve(ShellConfig::default()).unwrap();
        assert!(settings.shell.is_none());
        assert_eq!(settings.margin, DEFAULT_MARGIN);
        assert_eq!(settings.options, ShellOptions::default());
        assert_eq!(args.log_level, "warn");
    }

    #[test]
    fn growth_flags_conflict() {
        let parsed = Args::try_parse_from([
            "shellmesh",
            "--growth-ratio",
            "2",
            "--growth-step",
            "1",
            "in.msh",
            "out.msh",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn report_lists_domains_in_order() {
        let mut domains = DomainRegistry::new();
        domains.register_domain(Dim::Cell, 1, "sample").unwrap();
        domains.register_domain(Dim::Facet, 12, "shell_boundary").unwrap();
        let report = domain_report(&domains);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "cell        1  sample");
        assert_eq!(lines[2], "facet      12  shell_boundary");
    }
}
