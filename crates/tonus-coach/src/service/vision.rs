use serde_json::{json, Value};
use tonus_core::error::Result;
use tonus_core::types::{ChatMessage, ChatRequest, ImageData};
use tonus_llm::provider::LlmProvider;

/// Classifies a single photo as food, a fitness tracker screenshot, or
/// something else, and extracts structured data for the first two.
pub const PHOTO_ANALYSIS_PROMPT: &str = r#"Проанализируй фото. Это может быть ЕДА или СКРИНШОТ ФИТНЕС-ТРЕКЕРА (Apple Watch, Mi Band, Samsung Health и т.д.)

ВАЖНО: Отвечай ТОЛЬКО валидным JSON без markdown.

СНАЧАЛА определи тип фото и верни соответствующий JSON:

===== ЕСЛИ ЭТО ЕДА =====
{
    "type": "food",
    "description": "Краткое описание блюда на русском",
    "items": [
        {
            "name": "название продукта",
            "portion": "примерная порция (г или мл)",
            "calories": число,
            "protein": число,
            "carbs": число,
            "fat": число
        }
    ],
    "total": {
        "calories": общее число ккал,
        "protein": общий белок в граммах,
        "carbs": общие углеводы в граммах,
        "fat": общие жиры в граммах,
        "fiber": клетчатка в граммах
    },
    "meal_type": "breakfast" | "lunch" | "dinner" | "snack",
    "health_notes": "краткий комментарий о полезности блюда",
    "health_score": число от 1 до 10,
    "healthy_alternatives": ["альтернатива 1", "альтернатива 2"]
}

===== ЕСЛИ ЭТО ФИТНЕС-ТРЕКЕР / УМНЫЕ ЧАСЫ =====
{
    "type": "fitness",
    "device": "Apple Watch" | "Mi Band" | "Samsung" | "Garmin" | "другое",
    "activity_data": {
        "steps": число шагов (если видно),
        "calories_burned": сожжённые калории (если видно),
        "active_minutes": минуты активности (если видно),
        "distance_km": дистанция в км (если видно),
        "heart_rate": пульс (если видно),
        "floors": этажи (если видно),
        "workout_type": "тип тренировки если видно (бег, ходьба и т.д.)",
        "workout_duration_min": длительность тренировки в минутах (если видно)
    },
    "summary": "Краткое описание что видно на экране"
}

===== ЕСЛИ ЭТО ЧТО-ТО ДРУГОЕ =====
{
    "type": "other",
    "description": "Описание что на фото"
}

ВАЖНО:
- Для еды: если health_score < 6, предложи ЗОЖ-альтернативы
- Для фитнеса: извлеки ВСЕ числовые данные что видишь на экране
- Числа пиши без единиц измерения (просто числа)
- Для еды: оценивай порции реалистично по размеру на фото"#;

/// Prompt for an album of photos treated as one meal. `{photo_count}` is
/// substituted before sending.
const ALBUM_ANALYSIS_PROMPT: &str = r#"Ты получил НЕСКОЛЬКО фото (альбом). Это один приём пищи из нескольких блюд/продуктов.

КРИТИЧЕСКИ ВАЖНО:
- Тебе отправлено {photo_count} фото
- Ты ОБЯЗАН создать МИНИМУМ {photo_count} элементов в items (по одному на каждое фото)
- Каждое фото = ОТДЕЛЬНЫЙ item, даже если блюда похожи
- НЕ объединяй фото в один item

Отвечай ТОЛЬКО валидным JSON без markdown:

{
    "type": "food",
    "description": "Общее название (например: Обед: суп, салат и хлеб)",
    "items": [
        {
            "photo_number": 1,
            "name": "название с фото 1",
            "portion": "порция",
            "calories": число,
            "protein": число,
            "carbs": число,
            "fat": число
        },
        {
            "photo_number": 2,
            "name": "название с фото 2",
            "portion": "порция",
            "calories": число,
            "protein": число,
            "carbs": число,
            "fat": число
        }
    ],
    "total": {
        "calories": СУММА,
        "protein": СУММА,
        "carbs": СУММА,
        "fat": СУММА,
        "fiber": СУММА
    },
    "meal_type": "breakfast" | "lunch" | "dinner" | "snack",
    "health_notes": "комментарий",
    "health_score": 1-10
}

ПОМНИ: items должен содержать РОВНО {photo_count} элементов!"#;

/// Models wrap JSON in markdown fences often enough that every parse site
/// has to strip them first.
fn strip_code_fences(content: &str) -> &str {
    let mut s = content.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Parse a single-photo analysis. Unparseable output degrades to a zero-value
/// food entry carrying the raw text, so the user still gets something logged.
pub fn parse_photo_analysis(content: &str) -> Value {
    let stripped = strip_code_fences(content);
    match serde_json::from_str::<Value>(stripped) {
        Ok(parsed) => parsed,
        Err(_) => {
            let preview: String = content.chars().take(200).collect();
            json!({
                "type": "food",
                "description": preview,
                "total": {"calories": 0, "protein": 0, "carbs": 0, "fat": 0, "fiber": 0},
                "meal_type": "snack",
                "health_notes": "Не удалось точно определить состав",
                "raw_response": content,
            })
        }
    }
}

/// Parse an album analysis. Fewer items than photos is only a warning: the
/// totals are still usable.
pub fn parse_album_analysis(content: &str, photo_count: usize) -> Value {
    let stripped = strip_code_fences(content);
    match serde_json::from_str::<Value>(stripped) {
        Ok(parsed) => {
            let items = parsed["items"].as_array().map(|a| a.len()).unwrap_or(0);
            if items < photo_count {
                log!(" [vision] album returned {items} items for {photo_count} photos");
            }
            parsed
        }
        Err(_) => {
            log!(" [vision] failed to parse album response");
            json!({
                "type": "food",
                "description": format!("Приём пищи ({photo_count} фото)"),
                "total": {"calories": 0, "protein": 0, "carbs": 0, "fat": 0, "fiber": 0},
                "meal_type": "snack",
                "health_notes": "Не удалось точно определить состав",
                "raw_response": content,
            })
        }
    }
}

/// Run the photo classifier over one image.
pub async fn analyze_photo<P: LlmProvider>(llm: &P, image: ImageData) -> Result<Value> {
    let request = ChatRequest {
        messages: vec![ChatMessage::with_images(PHOTO_ANALYSIS_PROMPT, vec![image])],
        max_tokens: Some(1500),
        temperature: None,
    };
    let response = llm.chat(request).await?;
    Ok(parse_photo_analysis(&response.content))
}

/// Analyze an album of photos as a single meal. The user's caption, when
/// present, goes into the prompt ("это на двоих" halves the portions).
pub async fn analyze_album<P: LlmProvider>(
    llm: &P,
    images: Vec<ImageData>,
    caption: Option<&str>,
) -> Result<Value> {
    let photo_count = images.len();
    let mut prompt = if photo_count == 1 {
        PHOTO_ANALYSIS_PROMPT.to_string()
    } else {
        ALBUM_ANALYSIS_PROMPT.replace("{photo_count}", &photo_count.to_string())
    };
    if let Some(caption) = caption.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("\n\nПОДПИСЬ ПОЛЬЗОВАТЕЛЯ К ФОТО: {caption}\nУчти её при анализе."));
    }

    let request = ChatRequest {
        messages: vec![ChatMessage::with_images(prompt, images)],
        max_tokens: Some(2000),
        temperature: None,
    };
    let response = llm.chat(request).await?;
    if photo_count == 1 {
        Ok(parse_photo_analysis(&response.content))
    } else {
        Ok(parse_album_analysis(&response.content, photo_count))
    }
}

/// Revise a food analysis using the user's free-text correction.
/// Falls back to the original analysis when the model's output is unusable.
pub async fn correct_food_analysis<P: LlmProvider>(
    llm: &P,
    original: &Value,
    correction: &str,
) -> Value {
    let original_json =
        serde_json::to_string_pretty(original).unwrap_or_else(|_| original.to_string());

    let prompt = format!(
        r#"Пользователь отправил фото еды, я его проанализировал.
Теперь пользователь даёт уточнение. Скорректируй данные.

ОРИГИНАЛЬНЫЙ АНАЛИЗ:
{original_json}

УТОЧНЕНИЕ ПОЛЬЗОВАТЕЛЯ: {correction}

Верни ОБНОВЛЁННЫЙ JSON с учётом уточнения. Формат такой же:
{{
    "type": "food",
    "description": "обновлённое описание",
    "total": {{
        "calories": число,
        "protein": число,
        "carbs": число,
        "fat": число,
        "fiber": число
    }},
    "meal_type": "breakfast/lunch/dinner/snack",
    "health_notes": "обновлённый комментарий"
}}

ВАЖНО:
- Если пользователь говорит что чего-то нет (например "без сметаны") - убери это из расчёта
- Если пользователь уточняет напиток - добавь его калории
- Пересчитай КБЖУ с учётом изменений
- Сохрани остальные данные из оригинала если они не затронуты

Ответь ТОЛЬКО JSON, без markdown."#
    );

    let request = ChatRequest {
        messages: vec![ChatMessage::text("user", prompt)],
        max_tokens: Some(1500),
        temperature: None,
    };

    let content = match llm.chat(request).await {
        Ok(response) => response.content,
        Err(e) => {
            log!(" [vision] correction request failed: {e}");
            return original.clone();
        }
    };

    match serde_json::from_str::<Value>(strip_code_fences(&content)) {
        Ok(mut corrected) => {
            corrected["type"] = json!("food");
            corrected
        }
        Err(_) => {
            log!(" [vision] failed to parse corrected analysis");
            original.clone()
        }
    }
}

/// Estimate calories burned for a described activity. Asks the model first
/// and falls back to a MET table when the answer is unusable.
pub async fn estimate_activity_calories<P: LlmProvider>(
    llm: &P,
    activity: &str,
    duration_min: i64,
    weight_kg: f64,
) -> Value {
    let prompt = format!(
        r#"Оцени сожжённые калории для активности.

Активность: {activity}
Длительность: {duration_min} минут
Вес человека: {weight_kg} кг

Ответь ТОЛЬКО JSON:
{{
    "activity_type": "название активности",
    "calories_burned": число ккал,
    "intensity": "low" | "medium" | "high",
    "notes": "краткий комментарий"
}}"#
    );

    let request = ChatRequest {
        messages: vec![ChatMessage::text("user", prompt)],
        max_tokens: Some(300),
        temperature: None,
    };

    if let Ok(response) = llm.chat(request).await {
        if let Ok(parsed) = serde_json::from_str::<Value>(strip_code_fences(&response.content)) {
            if parsed["calories_burned"].as_i64().is_some() {
                return parsed;
            }
        }
    }

    met_estimate(activity, duration_min, weight_kg)
}

/// MET-table estimate, substring-matched on the activity name.
pub fn met_estimate(activity: &str, duration_min: i64, weight_kg: f64) -> Value {
    const MET_TABLE: [(&str, f64); 8] = [
        ("ходьба", 3.5),
        ("бег", 8.0),
        ("плавание", 6.0),
        ("велосипед", 5.0),
        ("тренировка", 5.0),
        ("йога", 2.5),
        ("фитнес", 5.5),
        ("танцы", 4.5),
    ];

    let lower = activity.to_lowercase();
    let met = MET_TABLE
        .iter()
        .find(|(name, _)| lower.contains(name))
        .map(|(_, met)| *met)
        .unwrap_or(4.0);

    let calories = (met * weight_kg * (duration_min as f64 / 60.0)) as i64;
    json!({
        "activity_type": activity,
        "calories_burned": calories,
        "intensity": "medium",
        "notes": "Примерный расчёт",
    })
}

/// Estimate calories from tracker metrics when the screenshot shows no
/// explicit burn figure. Roughly 0.04 kcal per step, 10 per floor, and 50
/// per km when distance is shown without steps.
pub fn estimate_tracker_calories(
    steps: Option<i64>,
    floors: Option<i64>,
    distance_km: Option<f64>,
) -> i64 {
    let mut estimated = 0i64;
    if let Some(steps) = steps {
        estimated += (steps as f64 * 0.04) as i64;
    }
    if let Some(floors) = floors {
        estimated += floors * 10;
    }
    if steps.is_none() {
        if let Some(km) = distance_km {
            estimated += (km * 50.0) as i64;
        }
    }
    estimated
}

/// Name for the ambient activity row derived from a tracker screenshot.
pub fn ambient_activity_name(workout_type: Option<&str>, steps: Option<i64>) -> String {
    if let Some(workout) = workout_type {
        if !workout.is_empty() {
            return workout.to_string();
        }
    }
    match steps {
        Some(s) if s > 8000 => "активный день".to_string(),
        Some(s) if s > 5000 => "ходьба".to_string(),
        _ => "дневная активность".to_string(),
    }
}
