use std::path::PathBuf;

use clap::Parser;

/// Interactive archiver for favorited TikTok videos.
///
/// Opens your profile in a driven browser session, waits for you to log in,
/// overlays a download button on every favorited video, and saves each video
/// you click along with an Airtable record and a Drive copy.
#[derive(Parser, Debug)]
pub struct Args {
    /// The TikTok account whose favorites page to open
    #[clap(env = "TIKTOK_USERNAME")]
    pub username: String,

    /// The directory the browser downloads into
    #[clap(long, env = "DOWNLOAD_DIR")]
    pub download_dir: PathBuf,

    /// Base URL of the running chromedriver to attach to
    #[clap(long, env = "WEBDRIVER_URL", default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    /// Airtable base holding the video records
    #[clap(long, env = "AIRTABLE_BASE_ID")]
    pub airtable_base: String,

    /// Airtable personal access token
    #[clap(long, env = "AIRTABLE_ACCESS_TOKEN_VALUE", hide_env_values = true)]
    pub airtable_token: String,

    /// Table name within the Airtable base
    #[clap(long, env = "AIRTABLE_TABLE_NAME")]
    pub airtable_table: String,

    /// OAuth bearer token for the Google Drive upload
    #[clap(long, env = "DRIVE_ACCESS_TOKEN", hide_env_values = true)]
    pub drive_token: String,

    /// Log at debug level instead of info
    #[clap(long, short)]
    pub verbose: bool,
}
