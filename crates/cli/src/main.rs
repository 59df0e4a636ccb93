fn main() {
    if let Err(error) = apistub_cli::run() {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}
