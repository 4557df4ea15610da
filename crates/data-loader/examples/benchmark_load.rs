use data_loader::DataIndex;
use std::path::Path;
use std::time::Instant;

fn main() {
    let data_dir = Path::new("data/sample");

    println!("Loading catalog from {}...\n", data_dir.display());

    let start = Instant::now();
    let index = match DataIndex::load_from_dir(data_dir) {
        Ok(index) => index,
        Err(e) => {
            eprintln!("Failed to load catalog: {e}");
            std::process::exit(1);
        }
    };
    let elapsed = start.elapsed();

    let (users, products, purchases, interests) = index.counts();
    let snapshot = index.snapshot();

    println!("\n=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Users: {}", users);
    println!("Products: {}", products);
    println!("Purchases: {}", purchases);
    println!("Interests: {}", interests);
    println!("Catalog version: {} (as of {})", snapshot.version, snapshot.as_of);
    let top: Vec<&str> = index.get_trending().iter().take(5).map(String::as_str).collect();
    println!("Trending: {:?}", top);
    println!(
        "\nPerformance: {:.0} records/second",
        (users + products + purchases + interests) as f64 / elapsed.as_secs_f64()
    );
}
