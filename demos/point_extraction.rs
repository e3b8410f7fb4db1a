use anyhow::{Result, bail};
use appeears::{Client, Credentials, Geometry, Point, PollOptions, TaskDescriptor};
use std::path::Path;

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Configure credentials via env vars or a `.appeearsrc` file.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = Client::from_env()?;
    let credentials = Credentials::from_env()?;

    let task = TaskDescriptor::new(
        "twin-cities-lst",
        "MOD11A1.061",
        ["LST_Day_1km", "LST_Night_1km"],
        "01-01-2020",
        "01-31-2020",
        Geometry::Points(vec![
            Point::new(44.98, -93.27, "MSP", "Urban"),
            Point::new(45.21, -93.02, "LINO", "Rural"),
        ]),
    );

    let destination = Path::new("appeears-output");
    std::fs::create_dir_all(destination)?;

    let outcome = client.get_data(&credentials, &task, destination, &PollOptions::every(60));
    if !outcome.success {
        bail!("{}", outcome.message);
    }

    for file in &outcome.files {
        println!("{}", file.display());
    }
    Ok(())
}
