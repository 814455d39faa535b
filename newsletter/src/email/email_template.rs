pub const DIGEST_EMAIL_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{ subject }}</title>
</head>
<body style="margin:0;padding:0;background:#f6f6f6;">
<div style="max-width:680px;margin:0 auto;padding:24px;background:#ffffff;font-family:Helvetica,Arial,sans-serif;font-size:15px;line-height:1.55;color:#1f1f1f;">
{{ body|safe }}
<p style="margin-top:32px;font-size:12px;color:#8a8a8a;">{{ footer }}</p>
</div>
</body>
</html>"#;
