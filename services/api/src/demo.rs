use crate::infra::parse_year;
use chrono::{Datelike, Utc};
use clap::Args;
use edu_program::config::DatabaseConfig;
use edu_program::error::AppError;
use edu_program::workflows::shortlist::{
    CriterionId, ImportSummary, ReferenceDataImporter, ShortlistError, ShortlistOutcome,
    ShortlistRequest, ShortlistService, SqliteShortlistStore,
};
use std::sync::Arc;

const DEMO_STATE: &str = "StateX";
const DEMO_DISTRICT: &str = "DistX";

const DEMO_JURISDICTIONS: &str = "code,name,kind,parent_code
S01,StateX,STATE,
D01,DistX,EDUCATION DISTRICT,S01
D02,DistY,EDUCATION DISTRICT,S01
B01,Alpha Block,BLOCK,D01
B02,Beta Block,BLOCK,D01
B03,Gamma Block,BLOCK,D02
";

const DEMO_CRITERIA: &str = "id,name
1,Top 4% (Weighted)
2,Top 8% (Weighted)
3,Interview Panel Review
";

const DEMO_BLOCKS: &[(&str, &str)] = &[("D01", "B01"), ("D01", "B02"), ("D02", "B03")];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Intake year for the synthetic cohort. Defaults to the current year.
    #[arg(long, value_parser = parse_year)]
    pub(crate) year: Option<i32>,
    /// Applicants generated for each block.
    #[arg(long, default_value_t = 100)]
    pub(crate) applicants_per_block: usize,
}

/// Loads the demo hierarchy, criteria and a deterministic cohort through the CSV importer.
pub(crate) fn seed_demo_data(
    store: &SqliteShortlistStore,
    year: i32,
    applicants_per_block: usize,
) -> Result<ImportSummary, AppError> {
    let jurisdictions =
        ReferenceDataImporter::jurisdictions_from_reader(DEMO_JURISDICTIONS.as_bytes(), store)?;
    let criteria = ReferenceDataImporter::criteria_from_reader(DEMO_CRITERIA.as_bytes(), store)?;
    let applicants = ReferenceDataImporter::applicants_from_reader(
        synthetic_applicants(year, applicants_per_block).as_bytes(),
        store,
    )?;
    Ok(ImportSummary {
        jurisdictions,
        criteria,
        applicants,
    })
}

fn synthetic_applicants(year: i32, per_block: usize) -> String {
    let mut csv =
        String::from("applicant_id,year,state_code,district_code,block_code,score_a,score_b\n");
    for (block_index, (district, block)) in DEMO_BLOCKS.iter().enumerate() {
        for index in 0..per_block {
            let score_a = 40.0 + ((index * 37 + block_index * 11) % 60) as f64;
            let score_b = 30.0 + ((index * 53 + block_index * 7) % 70) as f64;
            csv.push_str(&format!(
                "{block}-{year}-{index:04},{year},S01,{district},{block},{score_a:.1},{score_b:.1}\n"
            ));
        }
    }
    csv
}

fn demo_request(name: &str, criterion: i64, blocks: &[&str], year: i32) -> ShortlistRequest {
    ShortlistRequest {
        name: name.to_string(),
        description: "synthetic demo batch".to_string(),
        criterion_id: CriterionId(criterion),
        block_names: blocks.iter().map(|block| block.to_string()).collect(),
        state_name: DEMO_STATE.to_string(),
        district_name: DEMO_DISTRICT.to_string(),
        year,
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let year = args.year.unwrap_or_else(|| Utc::now().year());
    let database = DatabaseConfig::in_memory();
    let store = Arc::new(SqliteShortlistStore::open(
        &database.path,
        database.transaction_timeout,
    )?);
    let summary = seed_demo_data(&store, year, args.applicants_per_block)?;
    let service = ShortlistService::new(store);

    println!("Shortlisting demo ({year} intake)");
    println!(
        "- Loaded {} jurisdictions, {} criteria, {} applicants",
        summary.jurisdictions, summary.criteria, summary.applicants
    );
    for state in service.all_states()? {
        println!("- State {}", state.name);
        for district in service.districts_by_state(&state.name)? {
            let blocks = service
                .blocks_by_district(&district.name)?
                .into_iter()
                .map(|block| block.name)
                .collect::<Vec<_>>();
            println!("  - {}: {}", district.name, blocks.join(", "));
        }
    }
    println!("Criteria:");
    for criterion in service.criteria()? {
        let rule = service.resolve_criterion(criterion.id)?.rule;
        println!("  - [{}] {} -> {:?}", criterion.id, criterion.name, rule);
    }

    let pilot_name = format!("{year} Pilot");
    println!("\nCreating '{pilot_name}' for Alpha Block");
    let pilot = service.create_shortlist_batch(demo_request(&pilot_name, 1, &["Alpha Block"], year))?;
    render_outcome(&pilot);

    let retry_name = format!("{year} Expansion");
    println!("\nCreating '{retry_name}' for Alpha Block and Beta Block before freezing");
    match service.create_shortlist_batch(demo_request(
        &retry_name,
        2,
        &["Alpha Block", "Beta Block"],
        year,
    )) {
        Ok(outcome) => render_outcome(&outcome),
        Err(err @ ShortlistError::BlocksAlreadyShortlisted { .. }) => {
            println!("  Rejected: {err}");
        }
        Err(err) => return Err(err.into()),
    }

    let frozen = service.freeze_batch(pilot.batch_id)?;
    println!("\nFroze batch {} ({})", frozen.id, frozen.name);
    for block in service.blocks_by_district(DEMO_DISTRICT)? {
        let marker = if block.is_frozen_block { "frozen" } else { "open" };
        println!("  - {}: {}", block.name, marker);
    }

    println!("\nRetrying '{retry_name}'");
    let expansion = service.create_shortlist_batch(demo_request(
        &retry_name,
        2,
        &["Alpha Block", "Beta Block"],
        year,
    ))?;
    render_outcome(&expansion);

    let blocks = vec!["Alpha Block".to_string(), "Beta Block".to_string()];
    let count = service.shortlisted_count_for_blocks_and_year(&blocks, year)?;
    println!(
        "\nShortlisted so far in {} for {year}: {count}",
        blocks.join(" + ")
    );

    Ok(())
}

fn render_outcome(outcome: &ShortlistOutcome) {
    println!(
        "  Batch {} -> {} applicants ({:?})",
        outcome.batch_id, outcome.shortlisted_count, outcome.criterion_rule
    );
    for block in &outcome.blocks {
        let preview = block
            .selected
            .iter()
            .take(3)
            .map(|id| id.0.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  - {}: {} selected [{}{}]",
            block.block_name,
            block.selected.len(),
            preview,
            if block.selected.len() > 3 { ", ..." } else { "" }
        );
    }
    for skipped in &outcome.skipped_blocks {
        println!("  - {skipped}: not found, skipped");
    }
    for repeated in &outcome.duplicate_blocks {
        println!("  - {repeated}: repeated, ignored");
    }
}
