// Self-contained HTML page served with 429 responses

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width,initial-scale=1">
    <meta name="robots" content="noindex, nofollow">
    <title>Too Many Requests</title>
    <style>
        html, body {
            width: 100%;
            height: 100%;
            margin: 0;
            padding: 0;
            font-family: 'Montserrat', Helvetica, Arial, sans-serif;
            font-size: 25px;
        }
        main {
            width: 100%;
            height: 100%;
            display: flex;
            flex-direction: column;
            justify-content: center;
            align-items: center;
        }
        h1 {
            background: linear-gradient(90deg, #d53369 0%, #daae51 100%);
            -webkit-background-clip: text;
            background-clip: text;
            -webkit-text-fill-color: transparent;
            color: #d53369;
        }
    </style>
</head>
<body>
    <main>
        <h1>Hey, slow down!</h1>
        <p>"#;

const PAGE_TAIL: &str = r#"</p>
    </main>
</body>
</html>
"#;

// Render the rejection page around `message`
pub fn render_rate_limit_page(message: &str) -> String {
    let mut page = String::with_capacity(PAGE_HEAD.len() + message.len() + PAGE_TAIL.len());
    page.push_str(PAGE_HEAD);
    push_escaped(&mut page, message);
    page.push_str(PAGE_TAIL);
    page
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}
