//! Terminal front-end for lorekeeper.
//!
//! ```text
//! lorekeeper [config.toml]
//! ```
//!
//! Free text is sent as an action. Commands: `:levelup <stat>`, `:hint`,
//! `:save`, `:saves`, `:load <save_id>`, `:delete <save_id>`, `:quit`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use lorekeeper_core::persistence::{open_store, SaveStore};
use lorekeeper_core::{LoreConfig, LoreError, SaveId};
use lorekeeper_llm::TextGenerator;
use lorekeeper_session::logging::init_tracing;
use lorekeeper_session::{
    build_client, load_prompts, ActionRequest, GameService, LevelUpRequest, StartRequest,
};

const DEFAULT_CONFIG: &str = "lorekeeper.toml";

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = load_config(std::env::args().nth(1).map(PathBuf::from))?;
    init_tracing(&config.general.log_level);
    tracing::info!("Starting lorekeeper");

    let store = open_store(&config.persistence).context("opening save store")?;
    let client = build_client(&config.llm)?;
    let prompts = load_prompts(&config.llm);
    let service = GameService::new(client, store, config).with_prompts(prompts);

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let Some(save_id) = choose_session(&service, &mut input).await? else {
        return Ok(());
    };
    play(&service, save_id, &mut input).await
}

fn load_config(path: Option<PathBuf>) -> Result<LoreConfig> {
    let path = match path {
        Some(p) => p,
        None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
        None => return Ok(LoreConfig::default()),
    };
    LoreConfig::from_file(&path).with_context(|| format!("loading {}", path.display()))
}

async fn ask(input: &mut Input, prompt: &str) -> Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;
    Ok(input.next_line().await?.map(|l| l.trim().to_string()))
}

fn show_story(story_text: &str, choices: &[String]) {
    println!("\n{story_text}\n");
    for (i, choice) in choices.iter().enumerate() {
        println!("  {}. {choice}", i + 1);
    }
}

async fn choose_session<G: TextGenerator, S: SaveStore>(
    service: &GameService<G, S>,
    input: &mut Input,
) -> Result<Option<SaveId>> {
    let saves = service.list_saves()?;
    if !saves.is_empty() {
        println!("Saved games:");
        for (id, summary) in &saves {
            println!(
                "  {id}  {} (level {}) at {}",
                summary.player_name, summary.level, summary.location
            );
        }
    }

    loop {
        let Some(choice) =
            ask(input, "Save id to continue, or scenario (tavern/forest/prison/custom): ").await?
        else {
            return Ok(None);
        };
        if let Ok(id) = choice.parse::<SaveId>() {
            match service.load_game(id).await {
                Ok(state) => {
                    println!("\nWelcome back, {}.", state.player.name());
                    if let Some(last) = state.story_memory.last() {
                        println!("\n{last}");
                    }
                    return Ok(Some(id));
                }
                Err(e) => {
                    println!("{e}");
                    continue;
                }
            }
        }

        let name = ask(input, "Your name: ").await?;
        let custom_text = if choice.eq_ignore_ascii_case("custom") {
            ask(input, "Describe your adventure: ").await?
        } else {
            None
        };
        let request = StartRequest {
            name,
            scenario_id: Some(choice),
            custom_text,
        };
        match service.start_game(&request).await {
            Ok(started) => {
                println!("Save id: {}", started.save_id);
                show_story(&started.story_text, &started.choices);
                return Ok(Some(started.save_id));
            }
            Err(e @ (LoreError::UnknownScenario(_) | LoreError::MissingRequiredField(_))) => {
                println!("{e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn play<G: TextGenerator, S: SaveStore>(
    service: &GameService<G, S>,
    mut save_id: SaveId,
    input: &mut Input,
) -> Result<()> {
    while let Some(line) = ask(input, "\n> ").await? {
        let (command, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let arg = arg.trim();
        match command {
            "" => {}
            ":quit" | ":q" => break,
            ":hint" => println!("{}", service.get_hint(save_id).await?),
            ":save" => {
                service.save_game(save_id).await?;
                println!("Saved.");
            }
            ":saves" => {
                for (id, summary) in service.list_saves()? {
                    let marker = if id == save_id { "*" } else { " " };
                    println!("{marker} {id}  {} (level {})", summary.player_name, summary.level);
                }
            }
            ":load" => match arg.parse::<SaveId>() {
                Ok(id) => match service.load_game(id).await {
                    Ok(state) => {
                        save_id = id;
                        println!("Loaded {}.", state.player.name());
                    }
                    Err(e) => println!("{e}"),
                },
                Err(e) => println!("{e}"),
            },
            ":delete" => match arg.parse::<SaveId>() {
                Ok(id) if id == save_id => println!("Cannot delete the save you are playing."),
                Ok(id) => match service.delete_save(id).await {
                    Ok(()) => println!("Deleted {id}."),
                    Err(e) => println!("{e}"),
                },
                Err(e) => println!("{e}"),
            },
            ":levelup" => {
                let request = LevelUpRequest {
                    save_id: Some(save_id.to_string()),
                    stat: Some(arg.to_string()),
                };
                match service.level_up(&request).await {
                    Ok(outcome) => {
                        let grown = outcome.stat_increased.as_deref().unwrap_or("nothing");
                        println!(
                            "You reached level {}! ({grown} increased, HP {}/{})",
                            outcome.new_level, outcome.state.player.hp, outcome.state.player.max_hp
                        );
                    }
                    Err(e @ (LoreError::NoLevelUpPending | LoreError::MissingRequiredField(_))) => {
                        println!("{e}");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ => {
                let request = ActionRequest {
                    save_id: Some(save_id.to_string()),
                    action: Some(line.clone()),
                };
                let turn = service.process_action(&request).await?;
                show_story(&turn.story_text, &turn.choices);
                let p = &turn.state.player;
                println!(
                    "[HP {}/{}  Mana {}/{}  Level {}  XP {}/{}]",
                    p.hp, p.max_hp, p.mana, p.max_mana, p.level, p.xp, p.xp_to_next_level
                );
                if turn.level_up_pending {
                    println!("You feel stronger! Use :levelup <strength|agility|intelligence|dexterity>.");
                }
            }
        }
    }
    Ok(())
}
