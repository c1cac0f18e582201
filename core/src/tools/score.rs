use crate::agent::ToolParameter;
use crate::tools::typed_args;
use crate::traits::{Tool, ToolArguments};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameScore {
    pub game_id: &'static str,
    pub status: &'static str,
    pub home_team: &'static str,
    pub home_team_score: u32,
    pub away_team: &'static str,
    pub away_team_score: u32,
}

const LAKERS_WARRIORS: (&str, &str) = ("Los Angeles Lakers", "Golden State Warriors");
const HEAT_NUGGETS: (&str, &str) = ("Miami Heat", "Denver Nuggets");

/// Made-up results, keyed by a lowercase team-name fragment. Checked in order.
const SCORES: &[(&str, GameScore)] = &[
    (
        "warriors",
        GameScore {
            game_id: "401585601",
            status: "Final",
            home_team: LAKERS_WARRIORS.0,
            home_team_score: 1230,
            away_team: LAKERS_WARRIORS.1,
            away_team_score: 1234,
        },
    ),
    (
        "lakers",
        GameScore {
            game_id: "401585601",
            status: "Final",
            home_team: LAKERS_WARRIORS.0,
            home_team_score: 1400,
            away_team: LAKERS_WARRIORS.1,
            away_team_score: 2300,
        },
    ),
    (
        "nuggets",
        GameScore {
            game_id: "401585577",
            status: "Final",
            home_team: HEAT_NUGGETS.0,
            home_team_score: 880,
            away_team: HEAT_NUGGETS.1,
            away_team_score: 1000,
        },
    ),
    (
        "heat",
        GameScore {
            game_id: "401585577",
            status: "Final",
            home_team: HEAT_NUGGETS.0,
            home_team_score: 880,
            away_team: HEAT_NUGGETS.1,
            away_team_score: 1000,
        },
    ),
];

pub fn lookup_score(team_name: &str) -> Option<&'static GameScore> {
    let needle = team_name.to_lowercase();
    SCORES
        .iter()
        .find(|(key, _)| needle.contains(key))
        .map(|(_, score)| score)
}

#[derive(Debug, Deserialize)]
struct ScoreArgs {
    team_name: String,
}

/// Returns a fixed NBA result for a team, or an `"unknown"` score.
pub struct GameScoreTool;

#[async_trait]
impl Tool for GameScoreTool {
    fn name(&self) -> &str {
        "get_game_score"
    }

    fn description(&self) -> &str {
        "Get the score for a given NBA game."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::string(
            "team_name",
            "Name of one of the teams that played",
        )]
    }

    async fn execute(&self, args: &ToolArguments) -> anyhow::Result<Value> {
        let ScoreArgs { team_name } = typed_args(args)?;
        tracing::info!(%team_name, "get_game_score accessed");

        Ok(match lookup_score(&team_name) {
            Some(score) => serde_json::to_value(score)?,
            None => json!({ "team_name": team_name, "score": "unknown" }),
        })
    }
}
