//! KEYVEC CLI
//!
//! Interactive similarity queries over a plain-text vector table.

use clap::Parser;
use keyvec::{read_text_file, KeyedVectors, QueryOptions, SimilarityEngine, WeightedTerm};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// KEYVEC CLI - Interactive Vector Queries
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Vector table (one entity per line, optional `N D` header)
    vectors: PathBuf,

    /// Number of neighbours to print
    #[arg(short = 'n', long, default_value_t = 10)]
    topn: usize,

    /// Only rank the first N entities of the table
    #[arg(long)]
    restrict_vocab: Option<usize>,

    /// Read at most N vectors
    #[arg(long)]
    limit: Option<usize>,

    /// Normalize vectors in place at startup (the table becomes read-only)
    #[arg(long, default_value_t = false)]
    precompute: bool,
}

/// A parsed REPL line
#[derive(Debug, PartialEq)]
enum Command {
    Similar { positive: Vec<String>, negative: Vec<String> },
    Cosmul { positive: Vec<String>, negative: Vec<String> },
    Sim(String, String),
    Dist(String, String),
    Rank(String, String),
    Closer(String, String),
    Odd(Vec<String>),
    Vector(String),
}

fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("keyvec=info".parse()?))
        .init();

    let args = Args::parse();

    info!("Loading vectors from {}", args.vectors.display());
    let mut store = read_text_file(&args.vectors, args.limit)?;
    if args.precompute {
        store.init_sims(true);
    }

    let mut options = QueryOptions::default().with_topn(args.topn);
    if let Some(limit) = args.restrict_vocab {
        options = options.with_restrict_vocab(limit);
    }

    println!(
        "Loaded {} vectors of size {}. Type 'help' for available commands, 'quit' to exit.\n",
        store.len(),
        store.vector_size()
    );

    loop {
        print!("keyvec> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("help") {
            print_help();
            continue;
        }

        match parse_command(input).and_then(|cmd| execute(&store, &cmd, options)) {
            Ok(()) => {}
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}

/// Split `a b - c d` into positive and negative terms
fn split_terms(parts: &[&str]) -> (Vec<String>, Vec<String>) {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    let mut target = &mut positive;
    for part in parts {
        if *part == "-" {
            target = &mut negative;
            continue;
        }
        target.push(part.to_string());
    }
    (positive, negative)
}

fn pair(parts: &[&str], usage: &str) -> anyhow::Result<(String, String)> {
    if parts.len() != 3 {
        anyhow::bail!("usage: {}", usage);
    }
    Ok((parts[1].to_string(), parts[2].to_string()))
}

fn parse_command(input: &str) -> anyhow::Result<Command> {
    let parts: Vec<&str> = input.split_whitespace().collect();

    if parts.is_empty() {
        anyhow::bail!("Empty command");
    }

    let cmd = parts[0].to_lowercase();

    match cmd.as_str() {
        "similar" | "cosmul" => {
            let (positive, negative) = split_terms(&parts[1..]);
            if positive.is_empty() && negative.is_empty() {
                anyhow::bail!("{} requires terms: {} <pos>... [- <neg>...]", cmd, cmd);
            }
            if cmd == "similar" {
                Ok(Command::Similar { positive, negative })
            } else {
                Ok(Command::Cosmul { positive, negative })
            }
        }

        "sim" => {
            let (a, b) = pair(&parts, "sim <a> <b>")?;
            Ok(Command::Sim(a, b))
        }

        "dist" => {
            let (a, b) = pair(&parts, "dist <a> <b>")?;
            Ok(Command::Dist(a, b))
        }

        "rank" => {
            let (a, b) = pair(&parts, "rank <a> <b>")?;
            Ok(Command::Rank(a, b))
        }

        "closer" => {
            let (a, b) = pair(&parts, "closer <a> <b>")?;
            Ok(Command::Closer(a, b))
        }

        "odd" => {
            if parts.len() < 3 {
                anyhow::bail!("odd requires at least two entities: odd <a> <b> ...");
            }
            Ok(Command::Odd(parts[1..].iter().map(|s| s.to_string()).collect()))
        }

        "vec" => {
            if parts.len() != 2 {
                anyhow::bail!("usage: vec <entity>");
            }
            Ok(Command::Vector(parts[1].to_string()))
        }

        _ => anyhow::bail!("Unknown command: {}. Type 'help' for available commands.", parts[0]),
    }
}

fn terms(names: &[String]) -> Vec<WeightedTerm> {
    names.iter().map(|n| WeightedTerm::from(n.as_str())).collect()
}

fn print_ranked(result: &[(String, f32)]) {
    for (entity, score) in result {
        println!("  {:<24} {:.4}", entity, score);
    }
}

fn execute(store: &KeyedVectors, cmd: &Command, options: QueryOptions<'_>) -> anyhow::Result<()> {
    let engine = SimilarityEngine::new(store);

    match cmd {
        Command::Similar { positive, negative } => {
            print_ranked(&engine.most_similar(&terms(positive), &terms(negative), options)?);
        }
        Command::Cosmul { positive, negative } => {
            print_ranked(&engine.most_similar_cosmul(&terms(positive), &terms(negative), options)?);
        }
        Command::Sim(a, b) => println!("{:.4}", engine.similarity(a, b)?),
        Command::Dist(a, b) => println!("{:.4}", engine.distance(a, b)?),
        Command::Rank(a, b) => println!("{}", engine.rank(a, b)?),
        Command::Closer(a, b) => println!("{}", engine.closer_than(a, b)?.join(" ")),
        Command::Odd(entities) => println!("{}", engine.doesnt_match(entities)?),
        Command::Vector(entity) => println!("{:?}", store.get(entity)?),
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"
Available commands:

  similar <pos>... [- <neg>...]  - Nearest entities to the combined query
  cosmul <pos>... [- <neg>...]   - Same, with the multiplicative objective
  sim <a> <b>                    - Cosine similarity
  dist <a> <b>                   - Cosine distance
  rank <a> <b>                   - Rank of b among the neighbours of a
  closer <a> <b>                 - Entities closer to a than b is
  odd <a> <b> ...                - Entity that fits the group least
  vec <entity>                   - Print the stored vector

  help                           - Show this help
  quit / exit                    - Exit the CLI

Examples:
  similar king woman - man
  cosmul paris germany - france
  odd breakfast lunch cereal
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analogy() {
        let cmd = parse_command("similar king woman - man").unwrap();
        assert_eq!(
            cmd,
            Command::Similar {
                positive: vec!["king".to_string(), "woman".to_string()],
                negative: vec!["man".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("sim cat").is_err());
        assert!(parse_command("similar").is_err());
        assert!(parse_command("odd cat").is_err());
        assert!(parse_command("fly away").is_err());
    }

    #[test]
    fn test_parse_pairs() {
        assert_eq!(
            parse_command("RANK cat dog").unwrap(),
            Command::Rank("cat".to_string(), "dog".to_string())
        );
    }
}
