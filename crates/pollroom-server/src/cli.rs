use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pollroom-server", version, about = "Live classroom poll server")]
pub struct Args {
    /// Path to the TOML config file. A missing file means built-in defaults.
    #[arg(short, long, default_value = "pollroom.toml")]
    pub config: String,

    /// Listen address, overrides `server.bind_address` and `PORT`.
    #[arg(long)]
    pub bind: Option<String>,
}
