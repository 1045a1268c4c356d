use infnoise::{list_devices, InfNoise, OutputMode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Discover connected devices
    let devices = list_devices()?;
    if devices.is_empty() {
        eprintln!("No Infinite Noise devices found.");
        std::process::exit(1);
    }
    for dev in &devices {
        println!(
            "Found: {} — {} {} ({})",
            dev.port, dev.manufacturer, dev.description, dev.serial
        );
    }

    let mut trng = InfNoise::open(None, true, false)?;

    // The first read waits out the health check warm-up.
    let mut buf = [0u8; 32];
    trng.read_data(&mut buf, OutputMode::Whitened { multiplier: 1 })?;
    println!("\nWhitened:     {}", hex::encode(buf));

    // Four times the output per raw buffer, squeezed from the same state
    let mut big = [0u8; 128];
    trng.read_data(&mut big, OutputMode::Whitened { multiplier: 4 })?;
    println!("Multiplier 4: {}", hex::encode(big));

    // Debiased only, for diagnostics rather than keys
    trng.read_raw_data(&mut buf)?;
    println!("Raw:          {}", hex::encode(buf));

    let stats = trng.health_stats();
    println!("\nBuffers:      {}", stats.buffers);
    println!("Entropy/bit:  {:.4}", stats.entropy_per_bit);
    println!("Longest run:  {}", stats.longest_run);
    println!("Last buffer:  {} bits", trng.last_entropy());

    trng.close();
    Ok(())
}
