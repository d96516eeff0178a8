fn main() {
    if let Err(err) = chronos_lib::run() {
        eprintln!("chronos: {err:#}");
        std::process::exit(1);
    }
}
