use chrono::{DateTime, TimeZone};

use crate::app::types::ConversationMode;
use crate::services::profiles::{Gender, UserProfile};

const NONE_LISTED: &str = "لا يوجد";

/// Egyptian title for the user, from profession and gender
pub fn honorific(profile: &UserProfile) -> String {
    let by_gender = |male: &str, female: &str| match profile.gender {
        Gender::Male => male.to_string(),
        Gender::Female => female.to_string(),
    };
    match profile.profession.as_deref().map(str::trim) {
        Some(profession) if !profession.is_empty() => {
            let lowered = profession.to_lowercase();
            if lowered.contains("مهندس") {
                by_gender("بشمهندس", "بشمهندسه")
            } else if lowered.contains("دكتور") {
                by_gender("دكتور", "دكتوره")
            } else {
                profession.to_string()
            }
        }
        _ => by_gender("أستاذ", "أستاذة"),
    }
}

fn join_or_none(items: &[String]) -> String {
    let items: Vec<&str> = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        NONE_LISTED.to_string()
    } else {
        items.join("، ")
    }
}

fn mode_rules(mode: ConversationMode) -> &'static str {
    match mode {
        ConversationMode::Voice => {
            "المحادثة الآن صوتية:
- خلي الردود قصيرة وواضحة ومباشرة، وسؤال واحد بس في كل رسالة.
- اكتب كل الكلام بالعامية المصرية مع التشكيل الكامل علشان النطق يطلع صح.
- لو اتجابت وصفة، متعرضهاش كاملة: قول اسم الأكلة وفكرة التحضير في سطر أو اتنين.
- ممنوع القوايم والخطوات الطويلة."
        }
        ConversationMode::Text => {
            "المحادثة الآن نصية:
- لو اتجابت وصفة من قاعدة البيانات، اعرضها كاملة زي ما هي بالتشكيل من غير تلخيص.
- عدّل صيغة المخاطبة في خطوات الوصفة بس علشان تناسب نوع المستخدم."
        }
    }
}

/// Full system prompt for one session.
///
/// Pure: the same profile, mode and clock always render the same text, so
/// callers re-render whenever any of them changes.
pub fn render_system_prompt<Tz: TimeZone>(
    profile: &UserProfile,
    mode: ConversationMode,
    now: &DateTime<Tz>,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let title = honorific(profile);
    let gender = match profile.gender {
        Gender::Male => "ذكر",
        Gender::Female => "أنثى",
    };
    let calendar_status = if profile.calendar_connected {
        "متصل"
    } else {
        "غير متصل"
    };

    format!(
        "أنت مساعد طبخ ودود وخفيف الدم، بتتكلم بالعامية المصرية بس، واهتمامك كله بالأكل.
المستخدم اللي بتكلمه: {title} {name}، والنوع: {gender}. خاطبه دايماً حسب نوعه، ومتلخبطش في اللقب أو النوع.
ناديه باللقب أو الاسم في أول الكلام أو لما يكون مناسب بس، من غير تكرار.

ملف المستخدم:
- الأكلات المفضلة: {likes}
- الأكلات غير المفضلة: {dislikes}
- الحساسيات الغذائية: {allergies}
- الوصفات المفضلة من محادثات سابقة: {favorites}
خد الحاجات دي في اعتبارك في أي اقتراح. الحساسيات أهم حاجة: أي مكون بيعمل حساسية للمستخدم لازم تنبهه عليه وتقترح بديل.

تقويم جوجل: {calendar_status}.
لو متصل تقدر تساعده في المواعيد. لو مش متصل متحاولش توصل للتقويم، وممكن تقترح عليه يربطه.

الوقت الحالي {time} والتاريخ {date}. استخدمهم في الاقتراحات (فطار، غدا، عشا، سناك).

{mode_rules}

ممنوع تماماً:
- تخترع وصفة أو تتكلم عن وصفة مش موجودة في البيانات المسترجعة.
- تفترض إن صنف موجود لو ماتجابش من قاعدة البيانات.
- تذكر اسم أكلة محددة من عندك. لو محتاج تقترح، اتكلم عن أنواع عامة (فراخ، لحمة، مكرونة، شوربة، حلويات).
لو الوصفات المسترجعة مش هي اللي المستخدم عايزها، قوله بلطف واسأله يوضح أكتر هو عايز ياكل إيه.",
        title = title,
        name = profile.name,
        gender = gender,
        likes = join_or_none(&profile.likes),
        dislikes = join_or_none(&profile.dislikes),
        allergies = join_or_none(&profile.allergies),
        favorites = join_or_none(&profile.favorite_recipes),
        calendar_status = calendar_status,
        time = now.format("%H:%M"),
        date = now.format("%Y-%m-%d"),
        mode_rules = mode_rules(mode),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn profile() -> UserProfile {
        UserProfile {
            user_id: "u1".to_string(),
            name: "منى".to_string(),
            gender: Gender::Female,
            profession: Some("مهندسة برمجيات".to_string()),
            likes: vec!["محشي".to_string(), "ملوخية".to_string()],
            allergies: vec!["فول سوداني".to_string()],
            ..UserProfile::default()
        }
    }

    #[test]
    fn test_honorific_rules() {
        assert_eq!(honorific(&profile()), "بشمهندسه");

        let mut doctor = profile();
        doctor.gender = Gender::Male;
        doctor.profession = Some("دكتور أسنان".to_string());
        assert_eq!(honorific(&doctor), "دكتور");

        let mut instructor = profile();
        instructor.profession = Some("مدرسة".to_string());
        assert_eq!(honorific(&instructor), "مدرسة");

        let mut none = profile();
        none.profession = None;
        assert_eq!(honorific(&none), "أستاذة");
        none.gender = Gender::Male;
        assert_eq!(honorific(&none), "أستاذ");
    }

    #[test]
    fn test_render_includes_profile_lists_and_status() {
        let now = chrono_tz::Africa::Cairo
            .with_ymd_and_hms(2025, 7, 30, 13, 5, 0)
            .unwrap();
        let prompt = render_system_prompt(&profile(), ConversationMode::Text, &now);
        assert!(prompt.contains("بشمهندسه منى"));
        assert!(prompt.contains("الأكلات المفضلة: محشي، ملوخية"));
        assert!(prompt.contains("الأكلات غير المفضلة: لا يوجد"));
        assert!(prompt.contains("تقويم جوجل: غير متصل."));
        assert!(prompt.contains("الوقت الحالي 13:05 والتاريخ 2025-07-30"));
        assert!(prompt.contains("المحادثة الآن نصية"));
    }

    #[test]
    fn test_render_changes_with_mode_and_calendar() {
        let now = chrono_tz::Africa::Cairo
            .with_ymd_and_hms(2025, 7, 30, 13, 5, 0)
            .unwrap();
        let mut connected = profile();
        connected.calendar_connected = true;
        let voice = render_system_prompt(&connected, ConversationMode::Voice, &now);
        assert!(voice.contains("المحادثة الآن صوتية"));
        assert!(voice.contains("تقويم جوجل: متصل."));
        assert_ne!(voice, render_system_prompt(&profile(), ConversationMode::Voice, &now));
    }
}
