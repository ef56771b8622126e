use lexicon_reader::{
    api::{ApiClient, definition_message},
    auth::{AuthSession, lifetime_from_secs},
    cli::Cli,
    config::Config,
    logging::{self, LogLevel},
    reader::Reader,
    vocabulary::VocabularyManager,
};

use clap::Parser;
use eyre::{Result, eyre};
use std::io;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogLevel::from_verbosity(cli.verbose, cli.debug));

    let config = match &cli.config {
        Some(path) => Config::load_from(path.clone())?,
        None => match Config::new() {
            Ok(config) => config,
            Err(err) => {
                logging::warn(format!("Could not load configuration: {err}"));
                logging::warn("Starting with default settings");
                Config::default()
            }
        },
    };
    let settings = &config.settings;

    let mut api = ApiClient::new(settings)?;
    if let Some(token) = &cli.token {
        let lifetime = lifetime_from_secs(settings.token_lifetime_secs);
        api = api.with_auth(AuthSession::new(token.clone(), lifetime).with_expiry_timer());
    }

    if let Some(word) = &cli.define {
        println!("{}", definition_message(&api, word));
        return Ok(());
    }

    let mut vocabulary = VocabularyManager::new(&settings.base_words);
    for word in &cli.words {
        vocabulary.add_local(word);
    }

    if let Some(word) = &cli.submit {
        let message = vocabulary.submit(word, &api)?;
        println!("{message}");
        return Ok(());
    }

    if !cli.offline {
        vocabulary.refresh_from(&api, cli.book_id.as_deref());
    }

    let Some(ebook) = cli.ebook.as_deref() else {
        return Err(eyre!("No ebook given. Run with --help for usage."));
    };

    let mut reader = Reader::new(config, api, vocabulary);
    reader.open(ebook)?;

    if cli.dump {
        println!("{}", reader.dump(cli.location)?);
        return Ok(());
    }

    if let Some(location) = cli.location {
        reader.go_to(location)?;
    }
    let stdin = io::stdin();
    reader.run(stdin.lock(), io::stdout())
}
