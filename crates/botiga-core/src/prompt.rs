use crate::model::{ConversationMessage, Speaker};
use crate::providers::llm::{ChatMessage, ToolSpec};
use serde_json::json;

/// Which persona a prompt is being built for. The persona being played is
/// always rendered as the assistant role; its counterpart as the user role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    Buyer,
    Store,
}

impl Persona {
    fn speaker(&self) -> Speaker {
        match self {
            Persona::Buyer => Speaker::Buyer,
            Persona::Store => Speaker::Store,
        }
    }
}

pub const FINISHED_GOAL_NAME: &str = "finishedGoal";

/// Completion tool offered to the buyer persona; invoking it is the sole
/// early-termination signal for a simulation loop.
pub fn finished_goal_tool() -> ToolSpec {
    ToolSpec {
        name: FINISHED_GOAL_NAME.to_string(),
        description: "Report that you have finished (or given up on) your goal. \
                      Call this instead of writing another message."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "finished": {
                    "type": "boolean",
                    "description": "True if the goal was accomplished."
                },
                "information": {
                    "type": "string",
                    "description": "The information gathered while pursuing the goal."
                }
            },
            "required": ["finished", "information"]
        }),
    }
}

/// Replay the conversation as prompt history for the given persona.
///
/// Messages spoken by `played_by` map to the assistant role, the
/// counterpart's to the user role. Empty messages are dropped so degenerate
/// turns never re-enter a prompt.
pub fn render_history(
    conversation: &[ConversationMessage],
    played_by: Persona,
) -> Vec<ChatMessage> {
    let own = played_by.speaker();
    conversation
        .iter()
        .filter(|m| !m.message.trim().is_empty())
        .map(|m| {
            if m.from == own {
                ChatMessage::assistant(m.message.clone())
            } else {
                ChatMessage::user(m.message.clone())
            }
        })
        .collect()
}

pub fn buyer_system_prompt(goal: &str, max_turns: usize, language: &str) -> String {
    format!(
        "You are role-playing a customer contacting a small stationery and gift shop \
         over chat. Stay in character for the whole conversation and write every \
         message in {language}.\n\n\
         Your goal: {goal}\n\n\
         Rules:\n\
         - Pursue the goal naturally; one short message per turn.\n\
         - You have at most {max_turns} exchanges with the shop.\n\
         - As soon as you have the information you need (or you are sure the shop \
         cannot help), call the `finishedGoal` tool with `finished` and the \
         `information` you gathered instead of writing another message.\n\
         - Never mention that you are role-playing or that a tool exists."
    )
}

pub fn store_system_prompt(language: &str) -> String {
    format!(
        "{STORE_KNOWLEDGE}\n\n\
         You are the shop assistant answering the chat. Reply in {language}, \
         politely and briefly, using only the facts above. If something is not \
         covered by the facts, say you do not know."
    )
}

/// Static business-knowledge document for the store persona.
const STORE_KNOWLEDGE: &str = "\
Shop facts — La Ploma del Born (stationery & gifts):
- Address: Carrer de l'Argenteria 23, 08003 Barcelona.
- Opening hours: Monday to Saturday 10:00-20:00; Sunday closed.
- Phone: +34 933 101 214. No online shop; chat and in-store only.
- Products: notebooks (4.50-18 EUR), fountain pens (from 12 EUR, Lamy and
  Kaweco), ballpoint pens, inks, greeting cards, wrapping paper, small gifts.
- Gift wrapping: free with any purchase.
- Returns: 15 days with receipt, unused items only; no cash refunds for
  sale items (store credit instead).
- Payment: cash, card, Bizum.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::Role;

    fn convo() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage {
                from: Speaker::Buyer,
                message: "Hola, quan obriu?".into(),
            },
            ConversationMessage {
                from: Speaker::Store,
                message: "".into(),
            },
            ConversationMessage {
                from: Speaker::Store,
                message: "De dilluns a dissabte, de 10 a 20h.".into(),
            },
        ]
    }

    #[test]
    fn played_persona_is_assistant() {
        let as_buyer = render_history(&convo(), Persona::Buyer);
        assert_eq!(as_buyer[0].role, Role::Assistant);
        assert_eq!(as_buyer[1].role, Role::User);

        let as_store = render_history(&convo(), Persona::Store);
        assert_eq!(as_store[0].role, Role::User);
        assert_eq!(as_store[1].role, Role::Assistant);
    }

    #[test]
    fn empty_messages_never_replayed() {
        let history = render_history(&convo(), Persona::Buyer);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| !m.content.trim().is_empty()));
    }

    #[test]
    fn buyer_prompt_embeds_goal_turns_and_language() {
        let p = buyer_system_prompt("find the address", 10, "Catalan");
        assert!(p.contains("find the address"));
        assert!(p.contains("10 exchanges"));
        assert!(p.contains("Catalan"));
        assert!(p.contains(FINISHED_GOAL_NAME));
    }

    #[test]
    fn store_prompt_carries_business_knowledge() {
        let p = store_system_prompt("Catalan");
        assert!(p.contains("Carrer de l'Argenteria 23"));
        assert!(p.contains("Catalan"));
    }

    #[test]
    fn finished_goal_tool_contract() {
        let tool = finished_goal_tool();
        assert_eq!(tool.name, "finishedGoal");
        assert_eq!(
            tool.parameters["required"],
            serde_json::json!(["finished", "information"])
        );
        assert_eq!(tool.parameters["properties"]["finished"]["type"], "boolean");
        assert_eq!(
            tool.parameters["properties"]["information"]["type"],
            "string"
        );
    }
}
