use clap::Parser;
use group_hash::HashTable;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Percentage of inserted keys to remove afterwards.
    #[arg(short = 'r', long = "remove_percent", default_value_t = 30)]
    remove_percent: u64,
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<u64, u64> = HashTable::with_capacity(args.target_capacity);

    println!("Actual capacity: {}", table.capacity());
    println!("Filling table with u64 values...");

    let num_values = table.capacity() as u64;
    for value in 0..num_values {
        if table.insert(value, value).is_some() {
            panic!("Value already exists in table: {}", value);
        }
    }

    println!("Inserted {} values into table", table.len());
    table.probe_histogram().print();
    table.debug_stats().print();

    let mut removed = 0;
    for value in 0..num_values {
        if value % 100 < args.remove_percent {
            table.remove(&value);
            removed += 1;
        }
    }

    println!("Removed {} values", removed);
    table.debug_stats().print();

    println!("Refilling with fresh keys...");
    for value in num_values..num_values + removed {
        table.insert(value, value);
    }

    table.probe_histogram().print();
    table.debug_stats().print();
}
