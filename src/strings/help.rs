//! # Help Text
//!
//! Operator command reference, displayed via the `.help` command.

pub const MAIN: &str = concat!(
    "**🤖 Parley Help**\n",
    "Use: .command _args_\n",
    "\n",
    "**🧭 Conversations**\n",
    "* mode [room]: Show who is answering a room\n",
    "* human [room]: Hand a room to a human\n",
    "* unblock [room]: Give a room back to the assistant\n",
    "\n",
    "**📣 Broadcasts**\n",
    "* broadcast [room] [minutes] [message]: Post a message on repeat\n",
    "* broadcast [room] [json list]: Set a full rotation (content, media_ref, days/hours/minutes, enabled)\n",
    "* broadcast [room] off: Stop posting\n",
    "\n",
    "**⚡ Misc**\n",
    "* status: Connection and conversation overview\n",
    "* help\n"
);
