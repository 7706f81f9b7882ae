use anyhow::Result;
use social_login::log::set_global_logger;
use social_login::run;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    set_global_logger();

    let res = run(env::args().collect()).await?;
    println!("{res}");
    Ok(())
}
