fn main() {
    if let Err(err) = ontology_annotator::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
