use mapbox::{BoundingBox, MapboxApi};
use std::env;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    println!("Mapbox basemap snapshot test");

    let access_token = match env::var("MAPBOX_ACCESS_TOKEN") {
        Ok(token) => token,
        Err(_) => {
            eprintln!("MAPBOX_ACCESS_TOKEN is not set");
            std::process::exit(1);
        }
    };

    let api = MapboxApi::new(access_token);

    // Continental US
    let bbox = BoundingBox::new(-125.0, 24.0, -66.0, 50.0);
    let zoom = 4;

    println!("Bounding box: {}", bbox);
    println!("Zoom level: {}", zoom);

    match api.snapshot(bbox, zoom, 1280, 720).await {
        Ok(image) => {
            image.save("snapshot.png")?;
            println!("Saved snapshot.png ({}x{})", image.width(), image.height());
        }
        Err(e) => {
            println!("Error downloading snapshot: {}", e);
        }
    }

    Ok(())
}
