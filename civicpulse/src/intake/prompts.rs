//! Reply texts for the feedback dialogue
//!
//! Every outbound line the intake machine can produce lives here so the
//! dialogue reads consistently and tests can assert on exact replies.
//! User-facing failure text never carries internals.

/// Sent when a message matches no office and no session is open
pub const ONBOARDING: &str = "Welcome to CivicPulse. To share feedback about a government office, \
scan the QR code displayed at the office or send the office code printed on your receipt.";

/// Sent after an office match opens a new session
pub fn welcome(office_name: &str) -> String {
    format!(
        "Thank you for reaching out about {office_name}. What would you like to share?\n\
         1. My experience at this office\n\
         2. A policy suggestion\n\
         3. A process that needs reform\n\
         Reply 1, 2 or 3."
    )
}

/// Re-prompt for an invalid topic choice
pub const TOPIC_REPROMPT: &str = "Please reply 1, 2 or 3 to choose a topic.\n\
1. My experience at this office\n\
2. A policy suggestion\n\
3. A process that needs reform";

pub const OFFICE_RATING_PROMPT: &str =
    "How was your experience at this office? Reply with a number from 1 (very poor) to 5 (excellent).";

pub const RATING_REPROMPT: &str =
    "Please send a single number between 1 and 5 to rate your experience.";

/// Follow-up when the rating was 3 or below
pub const ISSUE_PROMPT: &str = "We are sorry to hear that. What was the main problem?\n\
1. Long waiting time\n\
2. Staff behaviour\n\
3. Bribe or informal payment demanded\n\
4. Incomplete or wrong information\n\
You can also describe the problem in your own words.";

/// Follow-up when the rating was 4 or 5
pub const POSITIVE_PROMPT: &str = "Glad to hear it! What did the office do well?";

pub const POLICY_NAME_PROMPT: &str = "Which policy or scheme is your suggestion about?";

pub const POLICY_IMPROVEMENT_PROMPT: &str = "What kind of improvement would help most?\n\
1. Simplify the procedure\n\
2. Make it fully online\n\
3. Reduce fees or charges\n\
4. Improve transparency\n\
Or describe it in your own words.";

pub const POLICY_BENEFICIARY_PROMPT: &str = "Who would benefit most from this change?\n\
1. Farmers\n\
2. Students\n\
3. Women\n\
4. Senior citizens\n\
5. Everyone";

pub const PROCESS_NAME_PROMPT: &str = "Which process or service was difficult to use?";

pub const PROCESS_DIFFICULTY_PROMPT: &str = "What made it difficult?\n\
1. Too many documents\n\
2. Too many office visits\n\
3. Unclear instructions\n\
4. Delays beyond the promised time\n\
Or describe it in your own words.";

pub const PROCESS_SUGGESTION_PROMPT: &str = "How do you think this process should work instead?";

/// Re-prompt when free text is too short to be useful
pub const TOO_SHORT_REPROMPT: &str =
    "Could you give a little more detail? A few words is enough.";

/// Terminal thank-you once a flow completes
pub const THANKS: &str = "Thank you! Your feedback has been recorded and will be reviewed. \
You can start again anytime by scanning an office QR code.";

/// Reply when a completed session receives another message
pub const ALREADY_COMPLETE: &str = "This feedback session is already complete. Scan an office \
QR code or send an office code to start a new one.";

/// Uniform user-facing failure reply; never carries error details
pub const GENERIC_FAILURE: &str =
    "Sorry, something went wrong on our side. Please try again in a few minutes.";
