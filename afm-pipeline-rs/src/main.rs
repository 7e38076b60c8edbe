fn main() {
    afm_pipeline::cli::run();
}
