//! # Cellfill CLI
//!
//! Command-line interface for filling spreadsheet templates.
//!
//! ## Usage
//!
//! ```bash
//! # Fill a template from a JSON record with the built-in site survey mapping
//! cellfill fill --template plantilla.xlsx --record sitio.json --id 42
//!
//! # Use a custom mapping, place images, write the report as JSON
//! cellfill fill --template t.xlsx --record r.json --id 42 \
//!     --mapping mapping.json --images fotos.json --report report.json
//!
//! # Check a template against a mapping without filling anything
//! cellfill validate --template plantilla.xlsx
//!
//! # Print a built-in mapping, or scaffold a blank template for it
//! cellfill preset link
//! cellfill scaffold --out plantilla.xlsx --preset link
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `cellfill=info`,
//! `cellfill=debug` with `-v`).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cellfill::{
    Assembler, CellfillError, EngineConfig, GenerationRequest, Record, TemplateMapping,
    fill::CancelToken,
    host::{MemoryHost, xlsx},
    images::ImagePlacement,
    mapping::presets,
};

/// Cellfill - template-driven spreadsheet fill engine
#[derive(Parser, Debug)]
#[command(name = "cellfill")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Built-in mappings
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum Preset {
    /// Site survey workbook
    #[default]
    Survey,
    /// Point-to-point link design workbook
    Link,
}

impl Preset {
    fn mapping(self) -> Result<TemplateMapping, CellfillError> {
        match self {
            Preset::Survey => presets::site_survey(),
            Preset::Link => presets::point_to_point(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fill a template from a record and save the document
    Fill {
        /// Template workbook (.xlsx)
        #[arg(long, value_name = "FILE")]
        template: PathBuf,

        /// Record as a JSON object
        #[arg(long, value_name = "FILE")]
        record: PathBuf,

        /// Identifier embedded in the output name
        #[arg(long)]
        id: String,

        /// Mapping file (overrides --preset)
        #[arg(long, value_name = "FILE")]
        mapping: Option<PathBuf>,

        /// Built-in mapping used when no mapping file is given
        #[arg(long, value_enum, default_value_t)]
        preset: Preset,

        /// JSON array of {"source": path, "target": "Sheet!A1:B2"}
        #[arg(long, value_name = "FILE")]
        images: Option<PathBuf>,

        /// Engine configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output directory (overrides config)
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Fill workers (overrides config)
        #[arg(long)]
        workers: Option<usize>,

        /// Cell writes per batch (overrides config)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Write the generation report here instead of stdout
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Validate a template against a mapping
    Validate {
        #[arg(long, value_name = "FILE")]
        template: PathBuf,

        #[arg(long, value_name = "FILE")]
        mapping: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t)]
        preset: Preset,

        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print a built-in mapping as JSON
    Preset {
        #[arg(value_enum, default_value_t)]
        name: Preset,

        /// Write to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Write a blank template containing every sheet a mapping requires
    Scaffold {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,

        #[arg(long, value_name = "FILE")]
        mapping: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t)]
        preset: Preset,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "cellfill=debug" } else { "cellfill=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<(), CellfillError> {
    match command {
        Commands::Fill {
            template,
            record,
            id,
            mapping,
            preset,
            images,
            config,
            output_dir,
            workers,
            batch_size,
            report,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }

            let mapping = load_mapping(mapping.as_deref(), preset)?;
            let record: Record = serde_json::from_str(&read(&record)?)?;
            let images: Vec<ImagePlacement> = match images {
                Some(path) => serde_json::from_str(&read(&path)?)?,
                None => Vec::new(),
            };

            let cache = config.build_cache();
            let assembler = Assembler::new(Arc::new(MemoryHost::new()), Arc::new(mapping), cache, config)?;
            let request = GenerationRequest::new(id, template, record).with_images(images);

            let runtime = tokio::runtime::Runtime::new()?;
            let generated = runtime.block_on(async {
                let cancel = CancelToken::new();
                let on_interrupt = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupt received, cancelling");
                        on_interrupt.cancel();
                    }
                });
                assembler.generate(request, &cancel).await
            })?;

            let json = serde_json::to_string_pretty(&generated)?;
            match report {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{}", json),
            }
            if generated.partial {
                eprintln!("Warning: document is incomplete, see report");
            }
        }

        Commands::Validate {
            template,
            mapping,
            preset,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let mapping = load_mapping(mapping.as_deref(), preset)?;
            let cache = config.build_cache();
            let assembler = Assembler::new(Arc::new(MemoryHost::new()), Arc::new(mapping), cache, config)?;

            let runtime = tokio::runtime::Runtime::new()?;
            let info = runtime.block_on(assembler.validate_template(&template))?;
            println!("{}: ok ({} bytes, {} sheets)", template.display(), info.size, info.sheets.len());
            for sheet in &info.sheets {
                println!("  {}", sheet);
            }
        }

        Commands::Preset { name, out } => {
            let json = serde_json::to_string_pretty(&name.mapping()?.to_file())?;
            match out {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{}", json),
            }
        }

        Commands::Scaffold { out, mapping, preset } => {
            let mapping = load_mapping(mapping.as_deref(), preset)?;
            let sheets = mapping.required_sheets();
            xlsx::write_blank_workbook(&out, &sheets)?;
            println!("Wrote {} ({} sheets)", out.display(), sheets.len());
        }
    }

    Ok(())
}

fn read(path: &Path) -> Result<String, CellfillError> {
    std::fs::read_to_string(path)
        .map_err(|e| CellfillError::Config(format!("cannot read {}: {}", path.display(), e)))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, CellfillError> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

fn load_mapping(path: Option<&Path>, preset: Preset) -> Result<TemplateMapping, CellfillError> {
    match path {
        Some(path) => TemplateMapping::load(path),
        None => preset.mapping(),
    }
}
