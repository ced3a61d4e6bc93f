//! Whittle CLI - mesh simplification command-line tool.
//!
//! Usage: whittle <COMMAND> [OPTIONS] <INPUT> [OUTPUT]
//!
//! Run `whittle --help` for available commands. Set `RUST_LOG=debug` for
//! details on the simplification run.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use whittle::algo::decimate::{Decimater, SimplifyOptions};
use whittle::algo::Progress;
use whittle::io;
use whittle::mesh::HalfEdgeMesh;

#[derive(Parser)]
#[command(name = "whittle")]
#[command(author, version, about = "Mesh simplification CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh information
    Info {
        /// Input mesh file
        input: PathBuf,
    },

    /// Simplify a triangle mesh by edge collapses
    Simplify {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        #[command(flatten)]
        target: Target,

        /// Maximum triangle aspect ratio (0 disables)
        #[arg(long, default_value = "0")]
        aspect_ratio: f64,

        /// Maximum edge length (0 disables)
        #[arg(long, default_value = "0")]
        edge_length: f64,

        /// Maximum vertex valence (0 disables)
        #[arg(long, default_value = "0")]
        max_valence: usize,

        /// Maximum normal deviation in degrees (0 disables)
        #[arg(long, default_value = "0")]
        normal_deviation: f64,

        /// Maximum Hausdorff error (0 disables)
        #[arg(long, default_value = "0")]
        hausdorff_error: f64,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Target {
    /// Target number of vertices
    #[arg(short, long)]
    vertices: Option<usize>,

    /// Target ratio of vertices to keep (0.0 to 1.0)
    #[arg(short, long)]
    ratio: Option<f64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Info { input } => {
            cmd_info(&input)?;
        }

        Commands::Simplify {
            input,
            output,
            target,
            aspect_ratio,
            edge_length,
            max_valence,
            normal_deviation,
            hausdorff_error,
        } => {
            let options = SimplifyOptions::default()
                .with_aspect_ratio(aspect_ratio)
                .with_edge_length(edge_length)
                .with_max_valence(max_valence)
                .with_normal_deviation(normal_deviation)
                .with_hausdorff_error(hausdorff_error);
            cmd_simplify(&input, &output, &target, &options)?;
        }
    }

    Ok(())
}

/// Create a progress reporter that displays a progress bar on the terminal.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0)); // Track highest percent seen (monotonic)

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let raw_percent = ((current * 100) + (total / 2)) / total;

        // Only redraw when the percentage grows
        let previous = max_percent.fetch_max(raw_percent, Ordering::Relaxed);
        if raw_percent <= previous && raw_percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (raw_percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);

        // Use carriage return to overwrite the line
        eprint!("\r[{}{}] {:3}% {}", bar, space, raw_percent, message);
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn cmd_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mesh: HalfEdgeMesh = io::load(input)?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.num_vertices());
    println!("Edges: {}", mesh.num_edges());
    println!("Faces: {}", mesh.num_faces());

    println!("Surface area: {:.6}", mesh.surface_area());

    if let Some((min, max)) = mesh.bounding_box() {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
        let diag = max - min;
        println!("Dimensions: {:.3} x {:.3} x {:.3}", diag.x, diag.y, diag.z);
    }

    println!("Average edge length: {:.6}", mesh.average_edge_length());

    match mesh.first_non_triangle() {
        None => println!("Mesh type: Triangle mesh"),
        Some((f, sides)) => println!(
            "Mesh type: Polygon mesh (face {} has {} sides, cannot be simplified)",
            f.index(),
            sides
        ),
    }

    let boundary_verts = mesh
        .vertex_ids()
        .filter(|&v| mesh.is_boundary_vertex(v))
        .count();
    if boundary_verts == 0 {
        println!("Topology: Closed (no boundary)");
    } else {
        println!("Topology: Open ({} boundary vertices)", boundary_verts);
    }

    Ok(())
}

fn cmd_simplify(
    input: &Path,
    output: &Path,
    target: &Target,
    options: &SimplifyOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut mesh: HalfEdgeMesh = io::load(input)?;

    println!("Loaded: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());

    let target_vertices = match (target.vertices, target.ratio) {
        (Some(vertices), _) => vertices,
        (None, Some(ratio)) => SimplifyOptions::target_from_ratio(mesh.num_vertices(), ratio)?,
        (None, None) => mesh.num_vertices(),
    };
    println!("Simplifying to {} vertices...", target_vertices);

    let progress = create_progress();

    let start = Instant::now();
    let stats = {
        let mut decimater = Decimater::new(&mut mesh)?;
        decimater.initialize(options)?;
        decimater.simplify_with_progress(target_vertices, &progress)?
    };
    let elapsed = start.elapsed();

    println!("Result: {}", stats);
    println!("Faces: {}", mesh.num_faces());
    io::save(&mesh, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);

    Ok(())
}
