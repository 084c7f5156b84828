use canlog_core::datalog::BinaryLogReader;
use canlog_core::decode::{builtin_catalog, SignalStore};
use canlog_core::frame::TimestampedFrame;
use std::env;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: decode_log <CAN_xxxx.bin>");
        return;
    }

    let path = &args[1];
    println!("Decoding: {}", path);

    let reader = match BinaryLogReader::open(path) {
        Ok(reader) => reader,
        Err(e) => {
            println!("Failed to read log: {}", e);
            return;
        }
    };

    let catalog = builtin_catalog();
    let mut store = SignalStore::new(&catalog);
    let mut count = 0u64;
    for record in reader {
        match record {
            Ok(record) => {
                let ts = record.timestamp_us as i64;
                store.apply(&catalog, &TimestampedFrame::new(ts, record.frame()));
                count += 1;
            }
            Err(e) => {
                println!("Stopped at record {}: {}", count, e);
                break;
            }
        }
    }

    println!("Records: {}", count);
    println!("\nLast values:");
    for (name, value) in store.valid_values() {
        println!("  - {}: {:.3} {}", name, value.value, value.unit.label());
    }
}
