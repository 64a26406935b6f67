fn main() {
    if let Err(err) = fin_report::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
