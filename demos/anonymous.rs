use tmi::{connect, Config, Event};

#[tokio::main]
async fn main() {
    let mut client = connect(Config {
        channels: vec!["moscowwbish".into()],
        ..Config::default()
    })
    .await
    .unwrap();
    let sender = client.sender();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("CTRL-C");
                break;
            },
            event = client.recv() => match event {
                Some(Event::Message(message)) => {
                    println!("#{} {}: {}", message.channel, message.user.name, message.text);
                    if message.text.starts_with("!stop") {
                        break;
                    }
                },
                Some(Event::Joined { channel }) => println!("joined #{}", channel),
                Some(other) => println!("{:?}", other),
                None => break,
            }
        }
    }

    sender.close();
}
