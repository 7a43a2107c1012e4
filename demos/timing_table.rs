use can_bittiming::controllers::Controller;
use strum::IntoEnumIterator;

static BITRATES: &[u32] = &[10_000, 20_000, 50_000, 125_000, 250_000, 500_000, 800_000, 1_000_000];

static FD_DATA_BITRATES: &[u32] = &[1_000_000, 2_000_000, 4_000_000, 5_000_000, 8_000_000];

fn main() {
    tracing_subscriber::fmt::init();

    // Optional controller name, e.g. `cargo run --example timing_table -- flexcan`
    let controllers: Vec<Controller> = match std::env::args().nth(1) {
        Some(name) => vec![Controller::from_name(&name).unwrap()],
        None => Controller::iter().collect(),
    };

    for controller in controllers {
        let profile = controller.profile();
        println!("{} ({} Hz)", controller, profile.clock_hz);

        for &bitrate in BITRATES {
            match controller.resolve(bitrate) {
                Ok(timing) => {
                    let registers = match controller.layout() {
                        Some(layout) => format!("{:x?}", timing.encode(layout)),
                        None => "-".to_string(),
                    };
                    println!("  {:>8}  {}  {}", bitrate, timing, registers);
                }
                Err(e) => println!("  {:>8}  {}", bitrate, e),
            }
        }

        if controller.data_profile().is_some() {
            for &data_bitrate in FD_DATA_BITRATES {
                match controller.resolve_fd(500_000, data_bitrate) {
                    Ok(timing) => println!("  {}", timing),
                    Err(e) => println!("  {:>8}  {}", data_bitrate, e),
                }
            }
        }
    }
}
