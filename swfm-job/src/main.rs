fn main() {
    match swfm_sync::app::run_job() {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            eprintln!("sync job failed: {err}");
            std::process::exit(1);
        }
    }
}
