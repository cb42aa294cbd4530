use crate::infra::{bootstrap, open_store, parse_year};
use clap::Args;
use edu_program::error::AppError;
use edu_program::workflows::shortlist::{
    CriterionId, ImportSummary, ReferenceDataImporter, ShortlistBatchId, ShortlistRequest,
    ShortlistService,
};
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub(crate) struct StoreArgs {
    /// Override APP_DATABASE_PATH
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// CSV with code,name,kind,parent_code
    #[arg(long)]
    pub(crate) jurisdictions: Option<PathBuf>,
    /// CSV with id,name
    #[arg(long)]
    pub(crate) criteria: Option<PathBuf>,
    /// CSV with applicant_id,year,state_code,district_code,block_code,score_a,score_b
    #[arg(long)]
    pub(crate) applicants: Option<PathBuf>,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

#[derive(Args, Debug)]
pub(crate) struct CreateArgs {
    /// Batch name shown in conflict messages
    #[arg(long)]
    pub(crate) name: String,
    #[arg(long, default_value = "")]
    pub(crate) description: String,
    /// Criterion id from `shortlisting_criteria`
    #[arg(long = "criterion")]
    pub(crate) criterion_id: i64,
    /// Block name to claim; repeat for several blocks
    #[arg(long = "block", required = true)]
    pub(crate) blocks: Vec<String>,
    #[arg(long)]
    pub(crate) state: String,
    #[arg(long)]
    pub(crate) district: String,
    #[arg(long, value_parser = parse_year)]
    pub(crate) year: i32,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

#[derive(Args, Debug)]
pub(crate) struct CountArgs {
    #[arg(long = "block", required = true)]
    pub(crate) blocks: Vec<String>,
    #[arg(long, value_parser = parse_year)]
    pub(crate) year: i32,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

#[derive(Args, Debug)]
pub(crate) struct BatchArgs {
    pub(crate) batch_id: i64,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

pub(crate) fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let config = bootstrap(args.store.database)?;
    let store = open_store(&config.database)?;

    // Parents first so a partial import still leaves a usable directory.
    let mut summary = ImportSummary::default();
    if let Some(path) = args.jurisdictions {
        summary.jurisdictions = ReferenceDataImporter::jurisdictions_from_path(path, &*store)?;
    }
    if let Some(path) = args.criteria {
        summary.criteria = ReferenceDataImporter::criteria_from_path(path, &*store)?;
    }
    if let Some(path) = args.applicants {
        summary.applicants = ReferenceDataImporter::applicants_from_path(path, &*store)?;
    }

    println!(
        "Imported {} jurisdictions, {} criteria, {} applicants into {}",
        summary.jurisdictions,
        summary.criteria,
        summary.applicants,
        config.database.path.display()
    );
    Ok(())
}

pub(crate) fn run_create(args: CreateArgs) -> Result<(), AppError> {
    let config = bootstrap(args.store.database)?;
    let service = ShortlistService::new(open_store(&config.database)?);

    let outcome = service.create_shortlist_batch(ShortlistRequest {
        name: args.name,
        description: args.description,
        criterion_id: CriterionId(args.criterion_id),
        block_names: args.blocks,
        state_name: args.state,
        district_name: args.district,
        year: args.year,
    })?;

    println!(
        "Created batch {} with {} shortlisted applicants",
        outcome.batch_id, outcome.shortlisted_count
    );
    for block in &outcome.blocks {
        println!("- {}: {} selected", block.block_name, block.selected.len());
    }
    if !outcome.skipped_blocks.is_empty() {
        println!(
            "Blocks not found in the directory: {}",
            outcome.skipped_blocks.join(", ")
        );
    }
    if !outcome.duplicate_blocks.is_empty() {
        println!(
            "Repeated block names ignored: {}",
            outcome.duplicate_blocks.join(", ")
        );
    }
    Ok(())
}

pub(crate) fn run_count(args: CountArgs) -> Result<(), AppError> {
    let config = bootstrap(args.store.database)?;
    let service = ShortlistService::new(open_store(&config.database)?);
    let count = service.shortlisted_count_for_blocks_and_year(&args.blocks, args.year)?;
    println!("{count}");
    Ok(())
}

pub(crate) fn run_freeze(args: BatchArgs) -> Result<(), AppError> {
    let config = bootstrap(args.store.database)?;
    let service = ShortlistService::new(open_store(&config.database)?);
    let batch = service.freeze_batch(ShortlistBatchId(args.batch_id))?;
    println!("Batch {} ({}) is frozen", batch.id, batch.name);
    Ok(())
}

pub(crate) fn run_discard(args: BatchArgs) -> Result<(), AppError> {
    let config = bootstrap(args.store.database)?;
    let service = ShortlistService::new(open_store(&config.database)?);
    service.discard_batch(ShortlistBatchId(args.batch_id))?;
    println!("Batch {} discarded", args.batch_id);
    Ok(())
}

pub(crate) fn run_list(args: StoreArgs) -> Result<(), AppError> {
    let config = bootstrap(args.database)?;
    let service = ShortlistService::new(open_store(&config.database)?);
    let batches = service.list_batches()?;
    if batches.is_empty() {
        println!("No shortlist batches");
    }
    for batch in batches {
        let state = if batch.frozen { "frozen" } else { "active" };
        let blocks = batch
            .blocks
            .iter()
            .map(|code| code.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "- {} | {} | {} | criterion {} | blocks [{}] | created {}",
            batch.id,
            batch.name,
            state,
            batch.criterion_id,
            blocks,
            batch.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
