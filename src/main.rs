fn main() {
    if let Err(err) = cliphome_lib::run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
