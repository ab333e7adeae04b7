use argh::FromArgs;
use base64::prelude::*;
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Face Infernum client for uploading images to the detection endpoints
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "info", "image" or "status"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Info(InfoCommand),
    Image(ImageCommand),
    Status(StatusCommand),
}

#[derive(FromArgs)]
/// Print the bounding boxes of the faces in an image
#[argh(subcommand, name = "info")]
struct InfoCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Fetch an image with the detected faces outlined
#[argh(subcommand, name = "image")]
struct ImageCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// box color as "R,G,B"
    #[argh(option, short = 'c')]
    box_color: Option<String>,

    /// where to write the annotated image; prints the JSON response when absent
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,
}

#[derive(FromArgs)]
/// Check the server's engine status
#[argh(subcommand, name = "status")]
struct StatusCommand {}

async fn upload_form(path: &Path) -> Result<Form, Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Form::new().part("file", Part::bytes(bytes).file_name(file_name)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let result = match args.command {
        ClientCommands::Info(info_command) => {
            client
                .post(format!("http://{}/detect-face-info/", addr))
                .multipart(upload_form(&info_command.image_path).await?)
                .send()
                .await?
                .json::<serde_json::Value>()
                .await?
        }
        ClientCommands::Image(image_command) => {
            let mut request = client.post(format!("http://{}/detect-faces-image/", addr));
            if let Some(box_color) = &image_command.box_color {
                request = request.query(&[("box_color", box_color)]);
            }
            let result = request
                .multipart(upload_form(&image_command.image_path).await?)
                .send()
                .await?
                .json::<serde_json::Value>()
                .await?;

            if let (Some(output), Some(image)) = (&image_command.output, result["image"].as_str()) {
                tokio::fs::write(output, BASE64_STANDARD.decode(image)?).await?;
                println!("Annotated image written to {}", output.display());
                return Ok(());
            }
            result
        }
        ClientCommands::Status(_) => {
            client
                .get(format!("http://{}/status", addr))
                .send()
                .await?
                .json::<serde_json::Value>()
                .await?
        }
    };

    println!("Result: {}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
