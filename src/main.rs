use clap::Parser;
use diskclone::cli::{self, Cli};
use diskclone::ui::prelude::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            emit(
                Level::Error,
                "diskclone.error",
                &format!("{} {:#}", char::from(NerdFont::CrossCircle), err),
                None,
            );
            1
        }
    };
    std::process::exit(code);
}
