use std::time::Duration;

use flagsync::{ClientConfig, DiffCache, FileRetriever, NotifierConfig};

pub fn main() -> flagsync::Result<()> {
    // Configure env_logger to see refreshes and flag changes.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("flagsync")).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/simple/flags.yaml".to_owned());

    let print_changes = |diff: &DiffCache| -> flagsync::Result<()> {
        println!(
            "{} added, {} updated, {} deleted",
            diff.added.len(),
            diff.updated.len(),
            diff.deleted.len()
        );
        Ok(())
    };

    let client = ClientConfig::new(FileRetriever::new(path))
        .polling_interval(Duration::from_secs(1))
        .notifier(NotifierConfig::custom(print_changes))
        .to_client()?;

    // Edit the flag file while this loop runs to see the changes being picked up.
    for _ in 0..10 {
        match client.get_flag("test-flag") {
            Some(flag) => println!("test-flag: {:?}", flag),
            // default value
            None => println!("test-flag: not found"),
        }
        std::thread::sleep(Duration::from_secs(1));
    }

    client.close()
}
