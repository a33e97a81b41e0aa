use crate::utils::TextRules;
use std::path::Path;

const CONFIG_PY: &str = r#"import os

TOKEN = os.getenv("DISCORD_TOKEN", "")
PREFIX = os.getenv("BOT_PREFIX", "!")
OWNER_IDS = []
LOG_CHANNEL_ID = None
"#;

const BOT_PY: &str = r#"import logging

import discord
from discord.ext import commands

log = logging.getLogger(__name__)


def create_bot(prefix="!"):
    intents = discord.Intents.default()
    intents.members = True
    intents.message_content = True
    return commands.Bot(command_prefix=prefix, intents=intents)
"#;

const MAIN_PY: &str = r#"import asyncio

import config
from bot import create_bot


async def main():
    bot = create_bot(config.PREFIX)
    async with bot:
        await bot.start(config.TOKEN)


if __name__ == "__main__":
    asyncio.run(main())
"#;

const REQUIREMENTS_TXT: &str = "discord.py>=2.3.0\naiohttp>=3.8.0\npython-dotenv>=1.0.0\n";

/// Content written when a file is missing and no backup holds a valid copy.
///
/// Every template passes `rules.is_plausible` for the file it is written to.
pub(crate) fn placeholder(file: &Path, rules: &TextRules) -> String {
    let known = match file.file_name().and_then(|name| name.to_str()) {
        Some("config.py") => Some(CONFIG_PY),
        Some("bot.py") => Some(BOT_PY),
        Some("main.py") => Some(MAIN_PY),
        Some("requirements.txt") => Some(REQUIREMENTS_TXT),
        _ => None,
    };
    if let Some(template) = known
        && rules.is_plausible(file, template)
    {
        return template.to_owned();
    }

    if rules.is_code(file) {
        format!(
            "# Placeholder written by the integrity guard.\n{}",
            declaration(rules)
        )
    } else {
        "# Placeholder written by the integrity guard.\n".to_owned()
    }
}

/// Minimal declaration prepended to a code file that lacks one.
pub(crate) fn declaration(rules: &TextRules) -> String {
    match rules.primary_token() {
        Some("import") => "import logging\n".to_owned(),
        Some(token) => format!("# {token}\n"),
        None => String::new(),
    }
}
