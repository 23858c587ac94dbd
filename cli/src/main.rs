use clap::{Parser, Subcommand, ValueEnum};
use anyhow::Result;
use std::path::Path;
use meshlet_oxide::prelude::*;

#[derive(Parser)]
#[command(name = "meshlet-cli")]
#[command(about = "A CLI tool for meshlet mesh compression")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode an OBJ file into a meshlet container
    Encode {
        /// Input file path
        #[arg(short, long)]
        input: String,

        /// Output file path
        #[arg(short, long)]
        output: String,

        /// Streams to encode
        #[arg(long, value_enum, default_value_t = Style::Textured)]
        style: Style,

        /// Print the encode statistics as JSON
        #[arg(long)]
        stats: bool,
    },
    /// Print the meshlet layout of a container
    Inspect {
        /// Input file path
        #[arg(short, long)]
        input: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Style {
    Wireframe,
    Textured,
}

impl From<Style> for MeshStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::Wireframe => MeshStyle::Wireframe,
            Style::Textured => MeshStyle::Textured,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Encode { input, output, style, stats } => convert_obj_to_meshlet(&input, &output, style.into(), stats),
        Command::Inspect { input } => inspect(&input),
    }
}

fn convert_obj_to_meshlet(input_path: &str, output_path: &str, style: MeshStyle, print_stats: bool) -> Result<()> {

    // Check input file extension
    let input_ext = Path::new(input_path)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    if input_ext != "obj" {
        anyhow::bail!("Input file must be a .obj file");
    }

    let mesh = meshlet_oxide::io::obj::load_obj(input_path)
        .map_err(|e| anyhow::anyhow!("Failed to load OBJ file: {}", e))?;

    let config = encode::Config::default();
    let stats = export_mesh_to_meshlet(output_path, &mesh, style, &config)
        .map_err(|e| anyhow::anyhow!("Failed to encode mesh: {}", e))?;

    log::info!("Wrote {} meshlets to {}", stats.meshlet_count, output_path);
    if print_stats {
        println!("{}", stats.to_json()?);
    }

    Ok(())
}

fn inspect(input_path: &str) -> Result<()> {
    let bytes = std::fs::read(input_path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", input_path, e))?;
    let view = MeshView::parse(&bytes)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", input_path, e))?;

    let header = view.format_header();
    println!("style: {:?}", header.style);
    println!("meshlets: {}", header.meshlet_count);
    println!("payload: {} words", header.payload_size_words);
    println!("primitives: {}", view.total_primitives());
    println!("vertices: {}", view.total_vertices());

    for (m, h) in view.headers().iter().enumerate() {
        let bound = &view.bounds()[m];
        println!(
            "meshlet {}: base vertex {}, {} chunks, center {:?}, radius {}",
            m, h.base_vertex_offset, h.num_chunks, bound.center, bound.radius
        );
        for &ty in header.style.stream_types().iter().filter(|&&ty| ty != StreamType::Primitive) {
            let s = view.stream(m, ty);
            let bits: Vec<u32> = (0..h.num_chunks as usize).map(|c| s.bits(c)).collect();
            println!("  {:?}: bits {:?}, aux {}", ty, bits, s.aux);
        }
    }

    Ok(())
}
