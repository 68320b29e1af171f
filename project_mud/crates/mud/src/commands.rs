use session::ActorId;

use crate::world::World;

/// Level at which the privileged commands unlock.
pub const ADMIN_LEVEL: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Look,
    Say(String),
    Who,
    Quit,
    Copyover,
    Shutdown,
    Unknown(String),
}

impl Command {
    pub fn is_privileged(&self) -> bool {
        matches!(self, Command::Copyover | Command::Shutdown)
    }
}

/// What the server has to do after a command ran against the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    Quit,
    Copyover,
    Shutdown,
}

/// Parse one interactive line. An empty line looks around.
pub fn parse_command(input: &str) -> Command {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Command::Look;
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").to_lowercase();
    let arg = parts.next().unwrap_or("").trim().to_string();

    match cmd.as_str() {
        "look" | "l" => Command::Look,
        "say" => Command::Say(arg),
        "who" => Command::Who,
        "quit" => Command::Quit,
        "copyover" => Command::Copyover,
        "shutdown" => Command::Shutdown,
        _ => Command::Unknown(cmd),
    }
}

/// Run `command` for `actor`. Everything the actor or bystanders should
/// see goes into actor buffers; session-level work is left to the caller
/// through the outcome.
pub fn execute(world: &mut World, actor: ActorId, command: Command) -> CommandOutcome {
    let Some((name, room, level)) = world.actor(actor).map(|a| (a.name.clone(), a.room, a.level)) else {
        return CommandOutcome::Done;
    };

    if command.is_privileged() && level < ADMIN_LEVEL {
        tell(world, actor, "Huh?\r\n");
        return CommandOutcome::Done;
    }

    match command {
        Command::Look => {
            let text = world.describe_room(actor);
            tell(world, actor, &text);
        }
        Command::Say(text) if text.is_empty() => {
            tell(world, actor, "Say what?\r\n");
        }
        Command::Say(text) => {
            tell(world, actor, &format!("You say '{text}'\r\n"));
            world.send_to_room(room, Some(actor), &format!("{name} says '{text}'\r\n"));
        }
        Command::Who => {
            let text = who_list(world);
            tell(world, actor, &text);
        }
        Command::Quit => return CommandOutcome::Quit,
        Command::Copyover => return CommandOutcome::Copyover,
        Command::Shutdown => return CommandOutcome::Shutdown,
        Command::Unknown(_) => tell(world, actor, "Huh?\r\n"),
    }
    CommandOutcome::Done
}

fn tell(world: &mut World, actor: ActorId, text: &str) {
    if let Some(a) = world.actor_mut(actor) {
        a.send(text);
    }
}

/// Connected players, highest level first.
fn who_list(world: &World) -> String {
    let mut online: Vec<_> = world.actors().filter(|a| !a.is_link_dead()).collect();
    online.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.name.cmp(&b.name)));

    let mut out = String::from("\r\nThe following players are online:\r\n");
    for a in &online {
        let rank = if a.level >= ADMIN_LEVEL {
            " Administrator".to_string()
        } else {
            format!("{:>14}", format!("Level {}", a.level))
        };
        out.push_str(&format!("[{rank}] {}\r\n", a.name));
    }
    out.push_str(&format!("\r\n{} player(s) online.\r\n", online.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Room, RoomId};
    use session::SessionId;

    fn world() -> World {
        World::new([Room {
            id: RoomId(2),
            zone: 1,
            name: "Town Square".into(),
            description: "A busy square.".into(),
        }])
    }

    #[test]
    fn parse_basic_commands() {
        assert_eq!(parse_command(""), Command::Look);
        assert_eq!(parse_command("  LOOK "), Command::Look);
        assert_eq!(parse_command("say Hello There"), Command::Say("Hello There".into()));
        assert_eq!(parse_command("who"), Command::Who);
        assert_eq!(parse_command("quit"), Command::Quit);
        assert_eq!(parse_command("copyover"), Command::Copyover);
        assert_eq!(parse_command("shutdown now"), Command::Shutdown);
        assert_eq!(parse_command("dance wildly"), Command::Unknown("dance".into()));
    }

    #[test]
    fn say_reaches_the_room() {
        let mut w = world();
        let a = w.spawn_actor("Alice", 1, RoomId(2));
        let b = w.spawn_actor("Bob", 1, RoomId(2));
        assert_eq!(execute(&mut w, a, Command::Say("hi".into())), CommandOutcome::Done);
        assert_eq!(w.actor_mut(a).unwrap().take_output(), "You say 'hi'\r\n");
        assert_eq!(w.actor_mut(b).unwrap().take_output(), "Alice says 'hi'\r\n");
    }

    #[test]
    fn unknown_answers_huh() {
        let mut w = world();
        let a = w.spawn_actor("Alice", 1, RoomId(2));
        execute(&mut w, a, Command::Unknown("dance".into()));
        assert_eq!(w.actor_mut(a).unwrap().take_output(), "Huh?\r\n");
    }

    #[test]
    fn privileged_commands_need_admin_level() {
        let mut w = world();
        let mortal = w.spawn_actor("Alice", 1, RoomId(2));
        let admin = w.spawn_actor("Root", ADMIN_LEVEL, RoomId(2));

        assert_eq!(execute(&mut w, mortal, Command::Copyover), CommandOutcome::Done);
        assert_eq!(w.actor_mut(mortal).unwrap().take_output(), "Huh?\r\n");
        assert_eq!(execute(&mut w, mortal, Command::Shutdown), CommandOutcome::Done);

        assert_eq!(execute(&mut w, admin, Command::Copyover), CommandOutcome::Copyover);
        assert_eq!(execute(&mut w, admin, Command::Shutdown), CommandOutcome::Shutdown);
        assert_eq!(execute(&mut w, mortal, Command::Quit), CommandOutcome::Quit);
    }

    #[test]
    fn who_lists_connected_players() {
        let mut w = world();
        let a = w.spawn_actor("Alice", 1, RoomId(2));
        let root = w.spawn_actor("Root", ADMIN_LEVEL, RoomId(2));
        w.spawn_actor("Ghost", 5, RoomId(2));
        w.actor_mut(a).unwrap().session = Some(SessionId(1));
        w.actor_mut(root).unwrap().session = Some(SessionId(2));

        execute(&mut w, a, Command::Who);
        let text = w.actor_mut(a).unwrap().take_output();
        let root_at = text.find("Root").unwrap();
        let alice_at = text.find("Alice").unwrap();
        assert!(root_at < alice_at);
        assert!(!text.contains("Ghost"));
        assert!(text.contains("2 player(s) online."));
    }
}
