use matchday::establish_connection;
use matchday::groups::recalculate_all_group_points;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut conn = establish_connection();
    let report = recalculate_all_group_points(&mut conn).expect("Failed to recalculate groups");
    println!(
        "Rebuilt {} groups ({} failed), repaired {} predictions.",
        report.groups_processed, report.groups_failed, report.predictions_repaired
    );
}
