fn main() {
    let exit_code = match pipemake::run::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("pipemake: error: {}", err);
            1
        }
    };
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
