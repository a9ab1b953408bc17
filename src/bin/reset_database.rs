use matchday::establish_connection;
use matchday::reconcile::reset_derived_state;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut conn = establish_connection();
    reset_derived_state(&mut conn).expect("Failed to reset derived state");
    println!("Standings, gameweek stats, snapshots, ledgers and scoring state have been reset.");
}
