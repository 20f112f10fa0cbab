//! Listing commands: leagues, tabs and characters

use clap::Parser;
use tracing::info;

use super::session::{ApiSession, CallContext};
use super::{Cli, CliError};
use crate::api::{ApiOperation, ApiPayload};
use crate::cache::SavedState;

/// Arguments naming a league
#[derive(Parser, Debug)]
pub struct LeagueArgs {
    /// League name (e.g., Standard)
    #[arg(long)]
    pub league: String,
}

/// Print the current leagues and remember them
pub async fn leagues(cli: &Cli) -> Result<(), CliError> {
    let mut session = ApiSession::start(cli)?;
    let payload = session
        .request(ApiOperation::Leagues, CallContext::Leagues)
        .await;
    session.finish().await?;

    let ApiPayload::Leagues(leagues) = payload? else {
        return Err(CliError::UnexpectedPayload("get_leagues"));
    };
    for league in &leagues {
        println!("{league}");
    }

    let cache = cli.cache();
    let mut state = SavedState::load_or_default(&cache.state_path())?;
    state.leagues = leagues;
    state.save(&cache.state_path())?;
    Ok(())
}

/// Print the tab listing of a league and remember it
pub async fn tabs(cli: &Cli, args: &LeagueArgs) -> Result<(), CliError> {
    let credentials = cli.credentials()?;
    let mut session = ApiSession::start(cli)?;
    let payload = session
        .request(
            ApiOperation::TabInfo {
                credentials: credentials.clone(),
                league: args.league.clone(),
            },
            CallContext::TabInfo,
        )
        .await;
    session.finish().await?;

    let ApiPayload::TabInfo(info) = payload? else {
        return Err(CliError::UnexpectedPayload("get_tab_info"));
    };
    info!(league = %args.league, tabs = info.num_tabs, "Fetched tab listing");
    println!("{} tabs in {}", info.num_tabs, args.league);
    for tab in &info.tabs {
        println!("{:>4}  {:<24} {}", tab.index, tab.name, tab.tab_type);
    }

    let cache = cli.cache();
    let mut state = SavedState::load_or_default(&cache.state_path())?;
    state
        .account_mut(&credentials.account)
        .league_mut(&args.league)
        .tabs = info.tabs;
    state.save(&cache.state_path())?;
    Ok(())
}

/// Print the characters playing in a league and remember them
pub async fn characters(cli: &Cli, args: &LeagueArgs) -> Result<(), CliError> {
    let credentials = cli.credentials()?;
    let mut session = ApiSession::start(cli)?;
    let payload = session
        .request(
            ApiOperation::CharacterList {
                credentials: credentials.clone(),
                league: args.league.clone(),
            },
            CallContext::CharacterList,
        )
        .await;
    session.finish().await?;

    let ApiPayload::Characters(names) = payload? else {
        return Err(CliError::UnexpectedPayload("get_character_list"));
    };
    for name in &names {
        println!("{name}");
    }

    let cache = cli.cache();
    let mut state = SavedState::load_or_default(&cache.state_path())?;
    state
        .account_mut(&credentials.account)
        .league_mut(&args.league)
        .character_names = names;
    state.save(&cache.state_path())?;
    Ok(())
}
