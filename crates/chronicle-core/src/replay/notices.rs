//! Embed builders for the notices replay adds around reconstructed events.

use chronicle_shared::record::Reaction;
use chronicle_shared::{Identity, Snowflake};
use serde_json::{json, Value};

/// rgb(3, 191, 153)
pub const NOTICE_COLOUR: u32 = 0x03_BF_99;

const MAX_DESCRIPTION_CHARS: usize = 4096;

/// Appended to a reply whose target was not replayed in this run.
pub const UNRESOLVED_REPLY_MARKER: &str =
    "-# ↪ reply to a message that is not part of this import";

fn truncate(text: &str) -> String {
    text.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

/// Author card prepended to a native reply.
pub fn reply_card(identity: &Identity, content: &str, has_embeds: bool) -> Value {
    let mut embed = json!({
        "color": NOTICE_COLOUR,
        "author": { "name": identity.name, "icon_url": identity.avatar_url },
    });
    if !content.is_empty() {
        embed["description"] = json!(truncate(content));
    }
    if has_embeds {
        embed["footer"] = json!({ "text": "This reply had embeds" });
    }
    embed
}

pub fn reactions_summary(reactions: &[Reaction]) -> Value {
    let mut description = String::from("|");
    for reaction in reactions {
        description.push_str(&format!(" {}: `{}` |", reaction.emoji, reaction.count));
    }
    json!({
        "color": NOTICE_COLOUR,
        "description": truncate(&description),
        "footer": { "text": "The above message had these reactions." },
    })
}

pub fn thread_created(identity: &Identity, thread: Snowflake, name: &str) -> Value {
    json!({
        "color": NOTICE_COLOUR,
        "author": { "name": identity.name, "icon_url": identity.avatar_url },
        "description": truncate(&format!("{} started a thread: **{name}** (<#{thread}>)", identity.name)),
    })
}

pub fn deleted_thread(identity: &Identity) -> Value {
    json!({
        "color": NOTICE_COLOUR,
        "author": { "name": identity.name, "icon_url": identity.avatar_url },
        "description": format!("{} started a thread here, but it was deleted before the export.", identity.name),
    })
}

pub fn ambiguous_thread(identity: &Identity) -> Value {
    json!({
        "color": NOTICE_COLOUR,
        "author": { "name": identity.name, "icon_url": identity.avatar_url },
        "description": format!(
            "{} started a thread here, but several threads matched it during the export. It needs to be restored by hand.",
            identity.name
        ),
    })
}

/// Thread markers cannot become threads when replaying into a thread.
pub fn nested_thread(identity: &Identity, name: &str) -> Value {
    json!({
        "color": NOTICE_COLOUR,
        "author": { "name": identity.name, "icon_url": identity.avatar_url },
        "description": truncate(&format!(
            "{} started the thread **{name}** here. Threads cannot be recreated inside a thread.",
            identity.name
        )),
    })
}
