#![allow(dead_code)]
use std::str::FromStr;

use anyhow::Result;
use api::*;
use clap::{Parser, Subcommand};
use secp256k1::{ecdsa::Signature, generate_keypair, rand, SecretKey};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};

use crate::client::Client;

mod api;
mod client;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,
}
#[derive(Subcommand)]
enum Commands {
    GenerateKeys,
    Login,
    /// Service id and permit domain of the server
    Info,
    Create {
        #[arg(short, long)]
        title: String,
        #[arg(long)]
        home: String,
        #[arg(long)]
        away: String,
    },
    Vote {
        #[arg(short, long)]
        prediction: PredictionId,
        #[arg(short, long, value_enum)]
        outcome: Outcome,
    },
    Close {
        #[arg(short, long)]
        prediction: PredictionId,
    },
    Show {
        #[arg(short, long)]
        prediction: PredictionId,
    },
    Count,
    /// Reveals the totals of a closed prediction you are allowed to decrypt
    Decrypt {
        #[arg(short, long)]
        prediction: PredictionId,
        #[arg(short, long, default_value_t = 10)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let client = Client::new(cli.url);

    match cli.command {
        Commands::GenerateKeys => {
            let keys = generate_keypair(&mut rand::thread_rng());
            println!("Pubkey: {}", keys.1);
            let mut private = File::create("ecdsa.key").await?;
            let mut public = File::create("ecdsa.pub").await?;
            private
                .write_all(format!("{}", keys.0.display_secret()).as_bytes())
                .await?;
            public.write_all(keys.1.to_string().as_bytes()).await?;
        }
        Commands::Login => {
            let secret_key = read_secret().await?;
            let access = client.login(&secret_key).await?;
            let mut file = File::create("access_token").await?;
            file.write_all(access.sig.to_string().as_bytes()).await?;
            let mut file = File::create("challenge").await?;
            file.write_all(access.challenge.as_bytes()).await?;
            println!("Logged in as {}", access.user);
        }
        Commands::Info => {
            let info = client.get_service_info().await?;
            println!("{:#?}", info);
        }
        Commands::Create { title, home, away } => {
            let request = CreatePredictionRequest {
                title,
                home_team: home,
                away_team: away,
            };
            let id = client.create_prediction(request, get_access().await?).await?;
            println!("Created prediction {}", id);
        }
        Commands::Vote {
            prediction,
            outcome,
        } => {
            let account = read_public().await?;
            let info = client.get_service_info().await?;
            let context = InputContext {
                service: info.domain.service,
                prediction,
                account,
            };
            let vote = client.encrypt_vote(outcome, context).await?;
            client
                .submit_prediction(
                    SubmitPredictionRequest { prediction, vote },
                    get_access().await?,
                )
                .await?;
            println!("Submitted encrypted vote on prediction {}", prediction);
        }
        Commands::Close { prediction } => {
            client
                .close_prediction(prediction, get_access().await?)
                .await?;
            println!("Closed prediction {}", prediction);
        }
        Commands::Show { prediction } => {
            let response = client.get_prediction(prediction).await?;
            println!("{:#?}", response);
        }
        Commands::Count => {
            println!("{}", client.get_prediction_count().await?);
        }
        Commands::Decrypt { prediction, days } => {
            let secret_key = read_secret().await?;
            let info = client.get_service_info().await?;
            let current = client.get_prediction(prediction).await?;
            let (_, ephemeral) = generate_keypair(&mut rand::thread_rng());
            let request = DecryptRequest::sign(
                &current,
                &info.domain,
                &secret_key,
                ephemeral,
                ValidityWindow::starting_now(days),
            );
            let totals = client.request_decrypt(request).await?;
            println!(
                "{}: {} | {}: {} | Draw: {}",
                current.home_team, totals.home, current.away_team, totals.away, totals.draw
            );
        }
    }
    Ok(())
}
async fn get_access() -> Result<AccessRequest> {
    let user = read_public().await?;
    let sig = read_token().await?;
    let challenge = read_challenge().await?;
    Ok(AccessRequest {
        user,
        sig,
        challenge,
    })
}
async fn read_file(path: &str) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut contents = vec![];
    file.read_to_end(&mut contents).await?;
    Ok(String::from_utf8(contents)?)
}
async fn read_secret() -> Result<SecretKey> {
    Ok(SecretKey::from_str(read_file("ecdsa.key").await?.as_str())?)
}
async fn read_public() -> Result<UserPubKey> {
    Ok(UserPubKey::from_str(read_file("ecdsa.pub").await?.as_str())?)
}
async fn read_token() -> Result<Signature> {
    Ok(Signature::from_str(read_file("access_token").await?.as_str())?)
}
async fn read_challenge() -> Result<String> {
    read_file("challenge").await
}
