#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole tail is one value, stored under `arg`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ValueCommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub arg: &'static str,
}

pub(crate) const VALUE_COMMANDS: &[ValueCommandSpec] = &[
    ValueCommandSpec {
        command: "model",
        action: "set_model",
        arg: "model",
    },
    ValueCommandSpec {
        command: "key",
        action: "set_api_key",
        arg: "key",
    },
];

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "add",
        action: "add_images",
    },
    CommandSpec {
        command: "upload",
        action: "add_images",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "models",
        action: "list_models",
    },
    CommandSpec {
        command: "closet",
        action: "show_closet",
    },
    CommandSpec {
        command: "history",
        action: "show_history",
    },
    CommandSpec {
        command: "clear",
        action: "clear_closet",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/help",
    "/model",
    "/models",
    "/key",
    "/add",
    "/closet",
    "/history",
    "/clear",
    "/quit",
];
