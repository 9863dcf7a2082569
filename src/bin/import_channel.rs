// Bulk-import a channel's recent videos into the catalog
use std::env;

use sqlx::postgres::PgPoolOptions;

use videoteca::catalog;
use videoteca::models::video::VideoCategory;
use videoteca::youtube_client::{MetadataApi, YouTubeClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let mut args = env::args().skip(1);
    let channel_id = match args.next() {
        Some(id) => id,
        None => {
            eprintln!("Usage: import_channel <channel_id> [max_results] [category_slug]");
            std::process::exit(2);
        }
    };
    let max_results: u32 = args.next().and_then(|v| v.parse().ok()).unwrap_or(25);
    let category = args
        .next()
        .and_then(|slug| VideoCategory::from_slug(&slug))
        .unwrap_or(VideoCategory::Otro);

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let api_key = env::var("YOUTUBE_API_KEY").expect("YOUTUBE_API_KEY must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    let client = YouTubeClient::new(Some(api_key));

    println!(
        "Fetching up to {} videos from channel {}...",
        max_results, channel_id
    );
    let videos = client.channel_videos(&channel_id, max_results).await?;
    println!("Found {} videos", videos.len());

    let mut imported = 0;
    let mut skipped = 0;
    for video in videos {
        let record = video.into_new_video(category, None);
        match catalog::insert_video_if_new(&pool, &record).await? {
            Some(saved) => {
                imported += 1;
                println!("  + {} ({})", saved.title, saved.youtube_id);
            }
            None => skipped += 1,
        }
    }

    println!(
        "Done: {} imported, {} already in the catalog",
        imported, skipped
    );
    Ok(())
}
