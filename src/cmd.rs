use clap::{Arg, ArgAction, Command, command};

use crate::provider::AppleLoginProvider;

pub const CONFIG_OPTION: &str = "config";
pub const STORE_OPTION: &str = "store";
pub const PROVIDER_OPTION: &str = "provider";
pub const RESPONSE_OPTION: &str = "response";
pub const REVOKE_OPTION: &str = "revoke";

pub fn cmd() -> Command {
    command!()
        .subcommand_required(true)
        .arg(
            Arg::new(CONFIG_OPTION)
                .long(CONFIG_OPTION)
                .global(true)
                .help("Service configuration (JSON); defaults to a single Apple provider with auto-login"),
        )
        .arg(
            Arg::new(STORE_OPTION)
                .long(STORE_OPTION)
                .global(true)
                .default_value(".social-login/storage.json")
                .help("File holding persisted sessions"),
        )
        .subcommand(Command::new("status").about("Show the user restored from the persisted session"))
        .subcommand(
            Command::new("sign-in")
                .about("Sign in by replaying a recorded vendor sign-in response")
                .arg(provider_arg())
                .arg(
                    Arg::new(RESPONSE_OPTION)
                        .long(RESPONSE_OPTION)
                        .required(true)
                        .help("File containing the vendor sign-in payload (JSON)"),
                ),
        )
        .subcommand(
            Command::new("sign-out")
                .about("Forget the persisted session of the signed-in provider")
                .arg(
                    Arg::new(REVOKE_OPTION)
                        .long(REVOKE_OPTION)
                        .action(ArgAction::SetTrue)
                        .help("Also revoke the grant where the provider supports it"),
                ),
        )
        .subcommand(
            Command::new("refresh")
                .about("Refresh the provider's auth token")
                .arg(provider_arg()),
        )
}

fn provider_arg() -> Arg {
    Arg::new(PROVIDER_OPTION)
        .long(PROVIDER_OPTION)
        .default_value(AppleLoginProvider::PROVIDER_ID)
        .help("Provider id")
}
