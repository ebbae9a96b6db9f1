//! `medwh stats`: summary of both raw tables.

use medwh_core::ImageCategory;

pub(crate) async fn run_stats(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let messages = medwh_db::message_table_stats(pool).await?;
    println!("raw.telegram_messages");
    println!("  messages: {}", messages.total_messages);
    println!("  channels: {}", messages.unique_channels);
    match (messages.earliest_date, messages.latest_date) {
        (Some(earliest), Some(latest)) => println!("  range:    {earliest} .. {latest}"),
        _ => println!("  range:    n/a"),
    }

    let detections = medwh_db::detection_table_stats(pool).await?;
    println!("raw.yolo_detections");
    println!("  images:   {}", detections.total_detections);
    println!("  messages: {}", detections.unique_messages);
    println!("  channels: {}", detections.unique_channels);
    for category in ImageCategory::ALL {
        println!(
            "  {:<16} {}",
            category.as_str(),
            detections.count_for(category.as_str())
        );
    }
    let unknown = detections.unknown_count();
    if unknown > 0 {
        println!("  {:<16} {unknown}", "unknown");
    }
    Ok(())
}
