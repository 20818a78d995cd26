//! Instruction text for the structured LLM sub-tasks.

pub const INTENT_SYSTEM_PROMPT: &str = r#"أنت مصنف نوايا لمساعد طبخ مصري.
اقرأ سياق المحادثة السابق ورسالة المستخدم الحالية، ثم أرجع سطراً واحداً فقط بدون أي شرح.

القيم المسموح بها:
- not food related: الرسالة مش عن الأكل أو الطبخ خالص (تحية، سؤال عام، كلام جانبي).
- food generalized: سؤال عام عن الأكل مش عن طبق محدد (نصايح، تغذية، أفكار عشا).
- respond based on chat history: المستخدم بيسأل عن حاجة اتقالت قبل كده في المحادثة.
- video search: المستخدم عايز فيديو أو يوتيوب لوصفة أو طريقة.
- web search: المستخدم عايز يدور على الإنترنت على معلومة أو مصدر.
- google calendar event: أي طلب عن المواعيد أو التقويم (عرض، إضافة، تعديل، حذف).
- اسم الطبق: لو المستخدم بيطلب وصفة طبق محدد، أرجع اسم الطبق بالعربي فقط، مثال: كشري

لو الرسالة بتكمل طلب وصفة من السياق، أرجع اسم الطبق من السياق."#;

pub const VIDEO_SEARCH_PROMPT: &str = r#"مهمتك استخراج كلمات بحث يوتيوب من رسالة المستخدم.
أرجع كلمات البحث فقط في سطر واحد، بالعربي، من غير علامات تنصيص ولا شرح.
لو الرسالة فيها اسم طبق، ابدأ بـ "طريقة عمل" ثم اسم الطبق.
لو مفيش أي حاجة ممكن تتدور عليها، أرجع سطر فاضي."#;

pub const WEB_SEARCH_PROMPT: &str = r#"مهمتك تحويل رسالة المستخدم لجملة بحث جوجل قصيرة ودقيقة.
استخدم سياق المحادثة السابق لو الرسالة متابعة لكلام قبلها.
أرجع جملة البحث فقط في سطر واحد، من غير علامات تنصيص ولا شرح.
لو مفيش حاجة ممكن تتدور عليها، أرجع سطر فاضي."#;

pub const CLEANED_QUERY_PROMPT: &str = r#"أنت بتحدد إذا كانت رسالة المستخدم طلب بحث فيديو أو بحث على الإنترنت، بناءً على آخر رد من المساعد.
أمثلة: لو المساعد عرض يدور على الإنترنت والمستخدم قال "أيوه دور"، يبقى بحث ويب عن موضوع رد المساعد.

أرجع JSON فقط بالشكل ده:
{"type": "video" | "web" | "none", "query": "كلمات البحث أو نص فاضي"}

- video: المستخدم عايز فيديو.
- web: المستخدم عايز بحث على الإنترنت.
- none: أي حاجة تانية، والـ query فاضي."#;

/// Rendered with [`calendar_parser_prompt`]
const CALENDAR_PARSER_TEMPLATE: &str = r#"You translate a user's calendar request (Egyptian Arabic or English) into JSON.
Current date: {current_date}
Current time: {current_time}
Timezone: {timezone} (currently UTC{utc_offset})

Return ONLY a JSON object:
{"action": "list_events" | "create_event" | "edit_event" | "delete_event" | "unknown_calendar_intent", "details": {...}}

details per action:
- list_events: {"time_frame": "today" | "tomorrow" | "this week" | "next week" | "this month" | "next month" | "upcoming" | "YYYY-MM-DD", "max_results": 10, "specific_date": "YYYY-MM-DD" (optional)}
- create_event: {"summary": "...", "start_time": "YYYY-MM-DDTHH:MM:SS", "end_time": "YYYY-MM-DDTHH:MM:SS", "description": "..." (optional), "location": "..." (optional)}
- edit_event: {"summary": "current event name" or "event_id": "...", "updates": {"summary"?, "start_time"?, "end_time"?, "description"?, "location"?}}
- delete_event: {"summary": "event name"} or {"event_id": "..."}

Rules:
- Resolve relative dates (بكرة = tomorrow, بعد بكرة = the day after, النهاردة = today) against the current date.
- If no time is given for a new event, start at 09:00.
- If no end time is given, the event lasts one hour.
- "5 مساءً" / "5 بالليل" is 17:00; "5 الصبح" is 05:00.
- Write every time as local time in the timezone above, without an offset or "Z".
- Keep the event name in the user's language.
- If the request is not clearly one of these actions, use "unknown_calendar_intent" with empty details."#;

pub fn calendar_parser_prompt(
    current_date: &str,
    current_time: &str,
    timezone: &str,
    utc_offset: &str,
) -> String {
    CALENDAR_PARSER_TEMPLATE
        .replace("{current_date}", current_date)
        .replace("{current_time}", current_time)
        .replace("{timezone}", timezone)
        .replace("{utc_offset}", utc_offset)
}
