use crate::models::Emotion;

pub const CLASSIFIER_PROMPT: &str = "You classify the emotional tone of a single message. \
Answer with exactly one word from this list: happy, sad, anxious, stressed, neutral.";

pub const TITLE_PROMPT: &str = "You name support conversations. Given the first message, \
reply with a short, gentle title of 3 to 6 words that captures the main feeling or concern. \
Use plain words, start with a capital letter, no quotes and no punctuation at the end. \
Reply with the title only.

Examples:
I've been feeling really anxious lately about work and can't sleep -> Anxiety About Work and Sleep
My relationship ended and I don't know how to move on -> Coping With Relationship Ending
How do I deal with stress from school? -> Managing School Stress";

const COMPANION_PROMPT: &str = "You are Menti, a warm and patient companion focused only on \
emotional well-being. Listen first, validate what the person feels, and never minimise it. \
Offer comfort before advice, and keep advice practical and kind: breathing, rest, journaling, \
reaching out to people they trust, professional help when it is needed. Never diagnose or \
suggest medication. If someone mentions self-harm or suicide, respond with care and urge them \
to contact a crisis line (988 in the US) or emergency services right away. If asked about \
unrelated topics, gently steer back to how they are feeling.

Reply in 4 to 7 sentences, in a friendly voice, refer back to earlier messages when it helps, \
and end with one caring follow-up question.";

fn emotion_guidance(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Happy => {
            "They are feeling good. Share the joy, help them notice what brought it, \
             and encourage them to hold on to it."
        }
        Emotion::Sad => {
            "They are sad. Stay with the feeling rather than rushing to fix it, \
             reassure them it is okay to hurt, and gently ask what is weighing on them."
        }
        Emotion::Anxious => {
            "They are anxious. Be calm and grounding, remind them anxious thoughts are \
             not facts, and offer a simple grounding step such as slow breathing."
        }
        Emotion::Stressed => {
            "They are stressed or overwhelmed. Acknowledge the load they carry, help them \
             find the heaviest part, and suggest smaller steps, boundaries or a break."
        }
        Emotion::Neutral => {
            "Their mood is unclear. Make it safe to open up, ask open questions, and let \
             them set the pace."
        }
    }
}

/// System prompt for reply generation, specialised for the detected emotion.
pub fn companion_prompt(emotion: Emotion) -> String {
    format!(
        "{}\n\nDetected emotion: {}\n{}",
        COMPANION_PROMPT,
        emotion,
        emotion_guidance(emotion)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_companion_prompt_names_emotion() {
        let prompt = companion_prompt(Emotion::Anxious);
        assert!(prompt.contains("Detected emotion: anxious"));
        assert!(prompt.contains("grounding"));
    }

    #[test]
    fn test_every_emotion_has_guidance() {
        for emotion in Emotion::ALL {
            assert!(!emotion_guidance(emotion).is_empty());
        }
    }
}
