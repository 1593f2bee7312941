//! Issues a signed bearer token for local testing, standing in for the
//! external identity provider.
//!
//! Usage: JWT_SECRET=... dev_token <nickname> [avatar_url]

use bookclub_chat::auth::create_jwt;
use bookclub_chat::chat::chat_models::ChatUser;
use uuid::Uuid;

fn main() {
    dotenv::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let nickname = args.next().unwrap_or_else(|| "dev-user".to_string());
    let avatar_url = args.next();

    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");

    let user = ChatUser {
        id: Uuid::new_v4(),
        nickname,
        avatar_url,
    };

    let token = create_jwt(&user, &secret, 24).expect("failed to sign token");
    println!("user_id: {}", user.id);
    println!("token: {}", token);
}
