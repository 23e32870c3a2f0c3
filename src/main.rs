fn main() {
    let mut args = std::env::args().skip(1);
    let result = match args.next().as_deref() {
        Some("--headless") => {
            let frames = args.next().and_then(|n| n.parse().ok()).unwrap_or(120);
            world_renderer::run_headless(frames).map(|stats| {
                println!("rendered {} frames", stats.len());
            })
        }
        _ => world_renderer::run(),
    };
    if let Err(err) = result {
        eprintln!("Application error: {err}");
        std::process::exit(1);
    }
}
