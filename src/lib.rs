pub mod audit;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod io_utils;
pub mod matcher;
pub mod pie;
pub mod pipeline;
pub mod propagate;
pub mod stats;
pub mod table;
pub mod tree;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{AnnotateArgs, AuditArgs, Cli, Commands, InputArgs},
    config::{MasstProfile, Settings},
    dataset::DataTable,
    pie::FieldTarget,
    pipeline::FieldStamp,
    tree::{GROUP_SIZE_FIELD, MATCHED_SIZE_FIELD, Node},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("ontology_annotator", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Annotate(args) => handle_annotate(&args),
        Commands::Audit(args) => handle_audit(&args),
    }
}

struct LoadedInputs {
    settings: Settings,
    tree: Node,
    data: Option<DataTable>,
}

fn load_inputs(args: &InputArgs) -> Result<LoadedInputs> {
    let profile = match &args.config {
        Some(path) => {
            let profile = MasstProfile::load(path)
                .with_context(|| format!("Loading profile from {path:?}"))?;
            debug!("Using profile {:?}", profile.name);
            Some(profile)
        }
        None => None,
    };
    let settings = Settings::resolve(
        args.ontology.as_deref(),
        args.node_key.as_deref(),
        args.data_key.as_deref(),
        profile.as_ref(),
    )?;

    info!("Loading ontology {:?}", settings.ontology);
    let tree = Node::load(&settings.ontology)
        .with_context(|| format!("Loading ontology from {:?}", settings.ontology))?;

    let data = match &args.in_data {
        Some(path) => {
            let delimiter = io_utils::resolve_input_delimiter(path, args.delimiter);
            let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
            info!(
                "Reading data '{}' with delimiter '{}'",
                path.display(),
                printable_delimiter(delimiter)
            );
            let data = DataTable::load(path, delimiter, encoding)
                .with_context(|| format!("Loading data table from {path:?}"))?;
            data.require_column(&settings.data_key)
                .with_context(|| format!("Validating columns of {path:?}"))?;
            Some(data)
        }
        None => None,
    };

    Ok(LoadedInputs {
        settings,
        tree,
        data,
    })
}

fn handle_annotate(args: &AnnotateArgs) -> Result<()> {
    let LoadedInputs {
        settings,
        mut tree,
        data,
    } = load_inputs(&args.input)?;

    let stamps = args
        .set_fields
        .iter()
        .map(|(field, value)| (field, value, FieldTarget::Node))
        .chain(
            args.set_pie_fields
                .iter()
                .map(|(field, value)| (field, value, FieldTarget::PieData)),
        )
        .map(|(field, value, target)| FieldStamp {
            field: field.clone(),
            value: value.clone(),
            target,
        })
        .collect::<Vec<_>>();

    pipeline::annotate_tree(
        &mut tree,
        data.as_ref(),
        &settings.node_key,
        &settings.data_key,
        &stamps,
    )?;

    tree.save(args.out_tree.as_deref(), args.pretty)?;
    if let Some(path) = &args.out_tree {
        info!("Annotated ontology written to {:?}", path);
    }
    Ok(())
}

fn handle_audit(args: &AuditArgs) -> Result<()> {
    let LoadedInputs {
        settings,
        mut tree,
        data,
    } = load_inputs(&args.input)?;

    if let Some(data) = &data {
        matcher::merge_rows(&mut tree, data, &settings.node_key, &settings.data_key)?;
    }

    let audits = audit::audit_fields(
        &tree,
        &[settings.node_key.as_str(), GROUP_SIZE_FIELD, MATCHED_SIZE_FIELD],
    );
    let headers = vec![
        "field".to_string(),
        "missing".to_string(),
        "nodes".to_string(),
        "percent".to_string(),
    ];
    let rows = audits.iter().map(|a| a.to_row()).collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!("Audited {} field(s) across {} node(s)", audits.len(), tree.node_count());
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
