use clap::Parser;
use tracing_subscriber::EnvFilter;

use shellmesh::cli::{domain_report, Args, LayerProgressBar};
use shellmesh::config::{load_config_file, ShellConfig};
use shellmesh::io::{read_mesh, write_mesh};
use shellmesh::mesher::Mesher;
use shellmesh::Result;

fn run(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => ShellConfig::default(),
    };
    let settings = args.resolve(config)?;

    println!("info: reading {}", args.source.display());
    let mut mesh = read_mesh(&args.source)?;
    println!(
        "info: loaded {} vertices, {} cells and {} facets",
        mesh.vertices().len(),
        mesh.cells().len(),
        mesh.facets().len()
    );

    let prepared = mesh.domains_mut().prepare_domains();
    if prepared > 0 {
        println!("info: named {prepared} domain(s) found only as raw tags");
    }

    let mut mesher = Mesher::from_mesh(mesh).with_options(settings.options);
    if let Some(shell) = &settings.shell {
        println!(
            "info: creating {} shell layer(s) with margin {}",
            shell.layer_count, settings.margin
        );
        let mut progress = LayerProgressBar::new();
        let summary = mesher.create_shell_observed(
            shell.layer_count,
            &shell.resolutions,
            settings.margin,
            &mut progress,
        )?;
        let cells: usize = summary.layers.iter().map(|l| l.cells).sum();
        println!("info: added {cells} shell cells");
    }

    let output = if settings.scale == 1.0 {
        mesher.into_mesh()
    } else {
        mesher.scaled_mesh(settings.scale)?
    };

    print!("{}", domain_report(output.domains()));

    write_mesh(&output, &args.target)?;
    println!("info: wrote output to {}", args.target.display());
    Ok(())
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(err) = run(&args) {
        eprintln!("error: {err}");
        std::process::exit(1)
    }
}
